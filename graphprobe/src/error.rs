use thiserror::Error;

use crate::device::DeviceKind;

/// Checked failures raised by the runtime and the debug layer.
///
/// Public operations return `anyhow::Result`; use
/// `err.downcast_ref::<DebugError>()` to branch on the failure class.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DebugError {
    #[error("operator index {index} out of range (operator count {count})")]
    OperatorOutOfRange { index: usize, count: usize },
    #[error("node index {index} out of range (node count {count})")]
    NodeOutOfRange { index: usize, count: usize },
    #[error("output slot {slot} out of range for node {node} ({count} outputs)")]
    OutputSlotOutOfRange { node: usize, slot: usize, count: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("cannot find {0} among nodes")]
    NodeNotFound(String),
    #[error("buffer size mismatch: source has {src} bytes, destination has {dst}")]
    SizeMismatch { src: usize, dst: usize },
    #[error("no device api registered for {0}")]
    MissingDeviceApi(DeviceKind),
}
