use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::device::DeviceContext;
use crate::error::DebugError;

/// Element type of a buffer, named as in the graph json `dltype` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    #[serde(rename = "float32")]
    F32,
    #[serde(rename = "float64")]
    F64,
    #[serde(rename = "int32")]
    I32,
    #[serde(rename = "int64")]
    I64,
    #[serde(rename = "int8")]
    I8,
    #[serde(rename = "uint8")]
    U8,
}

impl DType {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "float32" => Ok(DType::F32),
            "float64" => Ok(DType::F64),
            "int32" => Ok(DType::I32),
            "int64" => Ok(DType::I64),
            "int8" => Ok(DType::I8),
            "uint8" => Ok(DType::U8),
            other => Err(anyhow!("unsupported dltype {}", other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::I8 => "int8",
            DType::U8 => "uint8",
        }
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F64 | DType::I64 => 8,
            DType::F32 | DType::I32 => 4,
            DType::I8 | DType::U8 => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rust scalar types that can live in a buffer.
pub trait Element: bytemuck::Pod {
    const DTYPE: DType;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:expr),+ $(,)?) => {
        $(impl Element for $ty {
            const DTYPE: DType = $dtype;
        })+
    };
}

impl_element!(f32 => DType::F32, f64 => DType::F64, i32 => DType::I32, i64 => DType::I64, i8 => DType::I8, u8 => DType::U8);

pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

type Storage = Arc<Mutex<Vec<u8>>>;

/// Handle onto a host-resident buffer.
///
/// Cloning shares the storage; several handles may view the same storage
/// with different shapes when the memory plan pools entries together.
#[derive(Clone)]
pub struct NdArray {
    storage: Storage,
    shape: Vec<usize>,
    dtype: DType,
    ctx: DeviceContext,
}

impl NdArray {
    pub fn empty(shape: &[usize], dtype: DType, ctx: DeviceContext) -> Self {
        let bytes = numel(shape) * dtype.size_in_bytes();
        Self::view(Arc::new(Mutex::new(vec![0u8; bytes])), shape, dtype, ctx)
    }

    pub fn from_slice<T: Element>(data: &[T], shape: &[usize], ctx: DeviceContext) -> Result<Self> {
        if numel(shape) != data.len() {
            return Err(anyhow!(
                "shape {:?} expects {} values, got {}",
                shape,
                numel(shape),
                data.len()
            ));
        }
        let bytes = bytemuck::cast_slice::<T, u8>(data).to_vec();
        Ok(Self::view(Arc::new(Mutex::new(bytes)), shape, T::DTYPE, ctx))
    }

    pub(crate) fn alloc_storage(bytes: usize) -> Storage {
        Arc::new(Mutex::new(vec![0u8; bytes]))
    }

    pub(crate) fn view(storage: Storage, shape: &[usize], dtype: DType, ctx: DeviceContext) -> Self {
        Self {
            storage,
            shape: shape.to_vec(),
            dtype,
            ctx,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn context(&self) -> DeviceContext {
        self.ctx
    }

    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    pub fn num_bytes(&self) -> usize {
        self.numel() * self.dtype.size_in_bytes()
    }

    pub fn shares_storage_with(&self, other: &NdArray) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<u8>>> {
        self.storage
            .lock()
            .map_err(|_| anyhow!("buffer storage lock poisoned"))
    }

    fn check_dtype<T: Element>(&self) -> Result<()> {
        if T::DTYPE != self.dtype {
            return Err(anyhow!(
                "buffer holds {} but {} was requested",
                self.dtype,
                T::DTYPE
            ));
        }
        Ok(())
    }

    /// Copy the buffer contents out as typed values.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.check_dtype::<T>()?;
        let len = self.num_bytes();
        let guard = self.lock()?;
        Ok(guard[..len]
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned::<T>)
            .collect())
    }

    pub fn write_slice<T: Element>(&self, data: &[T]) -> Result<()> {
        self.check_dtype::<T>()?;
        if data.len() != self.numel() {
            return Err(anyhow!(
                "buffer holds {} values, got {}",
                self.numel(),
                data.len()
            ));
        }
        let bytes = bytemuck::cast_slice::<T, u8>(data);
        let mut guard = self.lock()?;
        guard[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Raw byte copy into `dst`. No dtype conversion happens; only the byte
    /// sizes have to agree.
    pub fn copy_to(&self, dst: &NdArray) -> Result<()> {
        let src_len = self.num_bytes();
        let dst_len = dst.num_bytes();
        if src_len != dst_len {
            return Err(DebugError::SizeMismatch {
                src: src_len,
                dst: dst_len,
            }
            .into());
        }
        if self.shares_storage_with(dst) {
            return Ok(());
        }
        let bytes = self.lock()?[..src_len].to_vec();
        dst.lock()?[..dst_len].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn copy_from(&self, src: &NdArray) -> Result<()> {
        src.copy_to(self)
    }
}

impl fmt::Debug for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdArray")
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .field("ctx", &self.ctx)
            .finish()
    }
}
