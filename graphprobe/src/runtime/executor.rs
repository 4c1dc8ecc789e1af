use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::device::{CpuDeviceApi, DeviceApi, DeviceContext, DeviceKind};
use crate::error::DebugError;
use crate::graph::{describe_node, Graph};
use crate::kernel::KernelModule;
use crate::tensor::NdArray;

use super::facade::ExecutorFacade;
use super::storage::{entry_contexts, plan_storage};

type OpExec = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Reference executor: a loaded graph, its entry table and one optional
/// closure per node.
pub struct GraphRuntime {
    graph: Graph,
    contexts: Vec<DeviceContext>,
    device_apis: HashMap<DeviceKind, Arc<dyn DeviceApi>>,
    data_entry: Vec<NdArray>,
    op_execs: Vec<Option<OpExec>>,
    input_names: HashMap<String, usize>,
}

impl GraphRuntime {
    pub fn new(
        graph_json: &str,
        module: Arc<dyn KernelModule>,
        contexts: &[DeviceContext],
    ) -> Result<Self> {
        Self::from_graph(Graph::from_json(graph_json)?, module, contexts)
    }

    pub fn from_graph(
        graph: Graph,
        module: Arc<dyn KernelModule>,
        contexts: &[DeviceContext],
    ) -> Result<Self> {
        let entry_ctx = entry_contexts(&graph, contexts)?;
        let data_entry = plan_storage(&graph, &entry_ctx)?;
        let op_execs = build_op_execs(&graph, module.as_ref(), &data_entry)?;
        let input_names = graph
            .arg_nodes()
            .iter()
            .enumerate()
            .map(|(index, &nid)| (graph.nodes()[nid].name.clone(), index))
            .collect();

        let mut device_apis: HashMap<DeviceKind, Arc<dyn DeviceApi>> = HashMap::new();
        device_apis.insert(DeviceKind::Cpu, Arc::new(CpuDeviceApi));

        crate::trace!(
            "loaded graph: {} nodes, {} entries, {} runnable ops",
            graph.num_nodes(),
            graph.num_entries(),
            op_execs.iter().filter(|exec| exec.is_some()).count()
        );
        Ok(Self {
            graph,
            contexts: contexts.to_vec(),
            device_apis,
            data_entry,
            op_execs,
            input_names,
        })
    }

    /// Install the synchronization barrier for one device kind.
    pub fn register_device_api(&mut self, api: Arc<dyn DeviceApi>) {
        self.device_apis.insert(api.kind(), api);
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn contexts(&self) -> &[DeviceContext] {
        &self.contexts
    }

    pub fn entry_id(&self, nid: usize, slot: usize) -> Result<usize> {
        self.graph.entry_id(nid, slot)
    }

    pub fn num_inputs(&self) -> usize {
        self.graph.arg_nodes().len()
    }

    pub fn num_outputs(&self) -> usize {
        self.graph.heads().len()
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.input_names.get(name).copied()
    }

    pub fn get_input(&self, index: usize) -> Result<NdArray> {
        let nid = *self
            .graph
            .arg_nodes()
            .get(index)
            .ok_or_else(|| anyhow!("input index {} out of range ({} inputs)", index, self.num_inputs()))?;
        Ok(self.data_entry[self.entry_id(nid, 0)?].clone())
    }

    /// Copy `value` into graph input `index`.
    pub fn set_input(&mut self, index: usize, value: &NdArray) -> Result<()> {
        self.get_input(index)?.copy_from(value)
    }

    pub fn set_input_by_name(&mut self, name: &str, value: &NdArray) -> Result<()> {
        let index = self
            .input_index(name)
            .ok_or_else(|| anyhow!("unknown input: {}", name))?;
        self.set_input(index, value)
    }

    pub fn get_output(&self, index: usize) -> Result<NdArray> {
        let head = self
            .graph
            .heads()
            .get(index)
            .ok_or_else(|| anyhow!("output index {} out of range ({} outputs)", index, self.num_outputs()))?;
        Ok(self.data_entry[self.entry_id(head.node, head.slot)?].clone())
    }

    pub fn run(&mut self) -> Result<()> {
        for (index, exec) in self.op_execs.iter().enumerate() {
            if let Some(exec) = exec {
                if let Err(err) = exec() {
                    let name = &self.graph.nodes()[index].name;
                    crate::error!("node {} ({}) failed: {:#}", index, name, err);
                    return Err(err.context(format!("node {} failed", name)));
                }
            }
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.op_execs.len() {
            return Err(DebugError::OperatorOutOfRange {
                index,
                count: self.op_execs.len(),
            }
            .into());
        }
        Ok(())
    }
}

impl fmt::Debug for GraphRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphRuntime")
            .field("nodes", &self.graph.num_nodes())
            .field("entries", &self.data_entry.len())
            .field("runnable", &self.op_execs.iter().filter(|exec| exec.is_some()).count())
            .field("contexts", &self.contexts)
            .field("device_apis", &self.device_apis.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn build_op_execs(graph: &Graph, module: &dyn KernelModule, data_entry: &[NdArray]) -> Result<Vec<Option<OpExec>>> {
    let mut execs = Vec::with_capacity(graph.num_nodes());
    for node in graph.nodes() {
        if !node.is_runnable() {
            execs.push(None);
            continue;
        }
        let func_name = node.func_name().unwrap_or_default();
        let kernel = module
            .get_function(func_name)
            .ok_or_else(|| anyhow!("function {} not found in module (node {})", func_name, node.name))?;
        let mut args = Vec::with_capacity(node.inputs.len() + node.num_outputs());
        for input in &node.inputs {
            args.push(data_entry[graph.entry_id(input.node, input.slot)?].clone());
        }
        for slot in 0..node.num_outputs() {
            args.push(data_entry[graph.entry_id(node.index, slot)?].clone());
        }
        crate::trace!("bind {} ({} args)", describe_node(node), args.len());
        execs.push(Some(Box::new(move || kernel(args.as_slice())) as OpExec));
    }
    Ok(execs)
}

impl ExecutorFacade for GraphRuntime {
    fn operator_count(&self) -> usize {
        self.op_execs.len()
    }

    fn has_operator(&self, index: usize) -> bool {
        matches!(self.op_execs.get(index), Some(Some(_)))
    }

    fn execute_at(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        match &self.op_execs[index] {
            Some(exec) => exec(),
            None => Ok(()),
        }
    }

    fn buffer_at(&self, node: usize, slot: usize) -> Result<NdArray> {
        Ok(self.data_entry[self.entry_id(node, slot)?].clone())
    }

    fn context_of(&self, index: usize) -> Result<DeviceContext> {
        self.check_index(index)?;
        Ok(self.data_entry[self.entry_id(index, 0)?].context())
    }

    fn synchronize(&self, ctx: DeviceContext) -> Result<()> {
        self.device_apis
            .get(&ctx.kind)
            .ok_or(DebugError::MissingDeviceApi(ctx.kind))?
            .synchronize(ctx)
    }

    fn run_full(&mut self) -> Result<()> {
        self.run()
    }

    fn node_count(&self) -> usize {
        self.graph.num_nodes()
    }

    fn node_name(&self, node: usize) -> Result<&str> {
        Ok(self.graph.node(node)?.name.as_str())
    }
}
