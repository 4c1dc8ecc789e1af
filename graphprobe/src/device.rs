use std::fmt;

use anyhow::Result;
use serde::Serialize;

use crate::error::DebugError;

/// Device family, numbered with the DLPack device codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Cpu = 1,
    Gpu = 2,
    OpenCl = 4,
    Vulkan = 7,
}

impl DeviceKind {
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(DeviceKind::Cpu),
            2 => Ok(DeviceKind::Gpu),
            4 => Ok(DeviceKind::OpenCl),
            7 => Ok(DeviceKind::Vulkan),
            other => Err(DebugError::InvalidArgument(format!("unknown device type {other}")).into()),
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
            DeviceKind::OpenCl => "opencl",
            DeviceKind::Vulkan => "vulkan",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A device kind plus the ordinal of the device within that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceContext {
    pub kind: DeviceKind,
    pub id: u32,
}

impl DeviceContext {
    pub fn new(kind: DeviceKind, id: u32) -> Self {
        Self { kind, id }
    }

    pub fn cpu(id: u32) -> Self {
        Self::new(DeviceKind::Cpu, id)
    }

    /// Decode flattened `(device_type, device_id)` pairs as passed by a host.
    pub fn from_pairs(args: &[i64]) -> Result<Vec<Self>> {
        if args.len() % 2 != 0 {
            return Err(DebugError::InvalidArgument(format!(
                "device arguments come in (type, id) pairs, got {} values",
                args.len()
            ))
            .into());
        }
        args.chunks_exact(2)
            .map(|pair| {
                let kind = DeviceKind::from_code(pair[0])?;
                let id = u32::try_from(pair[1]).map_err(|_| {
                    DebugError::InvalidArgument(format!("invalid device id {}", pair[1]))
                })?;
                Ok(Self::new(kind, id))
            })
            .collect()
    }
}

impl fmt::Display for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.id)
    }
}

/// Device services the executor needs beyond kernel dispatch.
pub trait DeviceApi: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// Block until all work queued on `ctx` has completed.
    fn synchronize(&self, ctx: DeviceContext) -> Result<()>;
}

/// Host execution is synchronous, so the barrier has nothing to wait for.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuDeviceApi;

impl DeviceApi for CpuDeviceApi {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Cpu
    }

    fn synchronize(&self, _ctx: DeviceContext) -> Result<()> {
        Ok(())
    }
}
