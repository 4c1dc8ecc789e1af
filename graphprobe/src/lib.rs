pub mod logging;

mod debug;
mod device;
mod error;
mod graph;
mod kernel;
mod runtime;
mod tensor;

use std::sync::Arc;

use anyhow::Result;

pub use debug::{
    next_number, BenchmarkConfig, DebugCommand, DebugRuntime, LogObserver, NodeRef, Reply,
    RoundLog, RoundObserver, RoundSample, RoundSummary, TraceEvent, TraceEventKind, GROWTH_FACTOR,
};
pub use device::{CpuDeviceApi, DeviceApi, DeviceContext, DeviceKind};
pub use error::DebugError;
pub use graph::{describe_node, EntryAttrs, EntryRef, Graph, KernelAttrs, Node, NodeOp};
pub use kernel::{CpuModule, Kernel, KernelModule, NOP_FUNC};
pub use runtime::{ExecutorFacade, GraphRuntime};
pub use tensor::{numel, DType, Element, NdArray};

/// Load `graph_json` against `module` and wrap the executor in the debug
/// layer. `contexts` lists one context per device the graph runs on.
pub fn create(
    graph_json: &str,
    module: Arc<dyn KernelModule>,
    contexts: &[DeviceContext],
) -> Result<DebugRuntime<GraphRuntime>> {
    if contexts.is_empty() {
        return Err(DebugError::InvalidArgument(
            "expected at least one device context".to_string(),
        )
        .into());
    }
    Ok(DebugRuntime::new(GraphRuntime::new(graph_json, module, contexts)?))
}
