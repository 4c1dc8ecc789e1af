use anyhow::Result;

use crate::device::DeviceContext;
use crate::tensor::NdArray;

/// The executor surface the debug layer is built on.
///
/// Operator indices are dense over `0..operator_count()` and equal node
/// indices. A slot without a runnable closure still occupies its index.
pub trait ExecutorFacade {
    fn operator_count(&self) -> usize;

    /// Whether a runnable closure exists at `index`.
    fn has_operator(&self, index: usize) -> bool;

    /// Run the closure at `index` once; a slot without a closure is a no-op.
    fn execute_at(&mut self, index: usize) -> Result<()>;

    /// Buffer of output `slot` of node `node`, as stored in the entry table.
    fn buffer_at(&self, node: usize, slot: usize) -> Result<NdArray>;

    /// Device context of the first output buffer of operator `index`.
    fn context_of(&self, index: usize) -> Result<DeviceContext>;

    /// Block until all work queued on `ctx` has completed.
    fn synchronize(&self, ctx: DeviceContext) -> Result<()>;

    /// Run the whole graph in order.
    fn run_full(&mut self) -> Result<()>;

    fn node_count(&self) -> usize;

    fn node_name(&self, node: usize) -> Result<&str>;
}

impl<E: ExecutorFacade + ?Sized> ExecutorFacade for &mut E {
    fn operator_count(&self) -> usize {
        (**self).operator_count()
    }

    fn has_operator(&self, index: usize) -> bool {
        (**self).has_operator(index)
    }

    fn execute_at(&mut self, index: usize) -> Result<()> {
        (**self).execute_at(index)
    }

    fn buffer_at(&self, node: usize, slot: usize) -> Result<NdArray> {
        (**self).buffer_at(node, slot)
    }

    fn context_of(&self, index: usize) -> Result<DeviceContext> {
        (**self).context_of(index)
    }

    fn synchronize(&self, ctx: DeviceContext) -> Result<()> {
        (**self).synchronize(ctx)
    }

    fn run_full(&mut self) -> Result<()> {
        (**self).run_full()
    }

    fn node_count(&self) -> usize {
        (**self).node_count()
    }

    fn node_name(&self, node: usize) -> Result<&str> {
        (**self).node_name(node)
    }
}
