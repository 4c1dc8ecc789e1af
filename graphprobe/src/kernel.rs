use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;

use crate::tensor::NdArray;

/// Packed kernel entry point. Arguments are the node's input entries
/// followed by its output entries.
pub type Kernel = Arc<dyn Fn(&[NdArray]) -> Result<()> + Send + Sync>;

/// Function name that marks a placeholder node with no runnable closure.
pub const NOP_FUNC: &str = "__nop";

/// Compiled-module handle the runtime pulls node functions from.
pub trait KernelModule: Send + Sync {
    fn get_function(&self, name: &str) -> Option<Kernel>;
}

type BuiltinFn = fn(&[NdArray]) -> Result<()>;

static BUILTINS: Lazy<HashMap<&'static str, BuiltinFn>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, BuiltinFn> = HashMap::new();
    table.insert("copy", copy);
    table.insert("relu", relu);
    table.insert("negative", negative);
    table.insert("elemwise_add", elemwise_add);
    table.insert("elemwise_mul", elemwise_mul);
    table
});

/// Host module: the builtin f32 kernels plus any registered by the caller.
#[derive(Default, Clone)]
pub struct CpuModule {
    kernels: HashMap<String, Kernel>,
}

impl CpuModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel<F>(mut self, name: impl Into<String>, kernel: F) -> Self
    where
        F: Fn(&[NdArray]) -> Result<()> + Send + Sync + 'static,
    {
        self.kernels.insert(name.into(), Arc::new(kernel));
        self
    }

    pub fn into_shared(self) -> Arc<dyn KernelModule> {
        Arc::new(self)
    }
}

impl KernelModule for CpuModule {
    fn get_function(&self, name: &str) -> Option<Kernel> {
        if let Some(kernel) = self.kernels.get(name) {
            return Some(kernel.clone());
        }
        BUILTINS
            .get(name)
            .map(|func| Arc::new(*func) as Kernel)
    }
}

fn unary_args<'a>(name: &str, args: &'a [NdArray]) -> Result<(&'a NdArray, &'a NdArray)> {
    match args {
        [input, output] => Ok((input, output)),
        _ => Err(anyhow!("{} expects 2 arguments, got {}", name, args.len())),
    }
}

fn binary_args<'a>(
    name: &str,
    args: &'a [NdArray],
) -> Result<(&'a NdArray, &'a NdArray, &'a NdArray)> {
    match args {
        [lhs, rhs, output] => Ok((lhs, rhs, output)),
        _ => Err(anyhow!("{} expects 3 arguments, got {}", name, args.len())),
    }
}

fn map_unary(name: &str, args: &[NdArray], f: impl Fn(f32) -> f32) -> Result<()> {
    let (input, output) = unary_args(name, args)?;
    let values = input.to_vec::<f32>()?;
    let out = values.into_iter().map(f).collect::<Vec<_>>();
    output.write_slice(&out)
}

fn map_binary(name: &str, args: &[NdArray], f: impl Fn(f32, f32) -> f32) -> Result<()> {
    let (lhs, rhs, output) = binary_args(name, args)?;
    let a = lhs.to_vec::<f32>()?;
    let b = rhs.to_vec::<f32>()?;
    if a.len() != b.len() {
        return Err(anyhow!("{} operands differ in length: {} vs {}", name, a.len(), b.len()));
    }
    let out = a.iter().zip(&b).map(|(x, y)| f(*x, *y)).collect::<Vec<_>>();
    output.write_slice(&out)
}

fn copy(args: &[NdArray]) -> Result<()> {
    let (input, output) = unary_args("copy", args)?;
    input.copy_to(output)
}

fn relu(args: &[NdArray]) -> Result<()> {
    map_unary("relu", args, |x| x.max(0.0))
}

fn negative(args: &[NdArray]) -> Result<()> {
    map_unary("negative", args, |x| -x)
}

fn elemwise_add(args: &[NdArray]) -> Result<()> {
    map_binary("elemwise_add", args, |a, b| a + b)
}

fn elemwise_mul(args: &[NdArray]) -> Result<()> {
    map_binary("elemwise_mul", args, |a, b| a * b)
}
