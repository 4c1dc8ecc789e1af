use anyhow::Result;

use crate::runtime::ExecutorFacade;
use crate::tensor::NdArray;

use super::bench::BenchmarkConfig;
use super::DebugRuntime;

/// A node addressed either by graph index or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    Index(usize),
    Name(String),
}

impl From<usize> for NodeRef {
    fn from(index: usize) -> Self {
        NodeRef::Index(index)
    }
}

impl From<&str> for NodeRef {
    fn from(name: &str) -> Self {
        NodeRef::Name(name.to_string())
    }
}

impl From<String> for NodeRef {
    fn from(name: String) -> Self {
        NodeRef::Name(name)
    }
}

/// Operations a host binding can invoke on a debug runtime.
#[derive(Debug, Clone)]
pub enum DebugCommand {
    DebugRun { index: usize },
    GetOutputByLayer { node: usize, slot: usize },
    DebugGetOutput { node: NodeRef, dest: NdArray },
    RunIndividual { number: i64, repeat: i64, min_repeat_ms: i64 },
    /// Plain full-graph run of the underlying executor.
    Run,
}

#[derive(Debug, Clone)]
pub enum Reply {
    Unit,
    Seconds(f64),
    Buffer(NdArray),
}

impl Reply {
    pub fn as_seconds(&self) -> Option<f64> {
        match self {
            Reply::Seconds(secs) => Some(*secs),
            _ => None,
        }
    }

    pub fn into_buffer(self) -> Option<NdArray> {
        match self {
            Reply::Buffer(buffer) => Some(buffer),
            _ => None,
        }
    }
}

impl<E: ExecutorFacade> DebugRuntime<E> {
    pub fn dispatch(&mut self, command: DebugCommand) -> Result<Reply> {
        match command {
            DebugCommand::DebugRun { index } => self.debug_run(index).map(Reply::Seconds),
            DebugCommand::GetOutputByLayer { node, slot } => {
                self.get_output_by_layer(node, slot).map(Reply::Buffer)
            }
            DebugCommand::DebugGetOutput { node, dest } => {
                self.debug_get_output(node, &dest)?;
                Ok(Reply::Unit)
            }
            DebugCommand::RunIndividual {
                number,
                repeat,
                min_repeat_ms,
            } => {
                self.run_individual(BenchmarkConfig::new(number, repeat, min_repeat_ms))?;
                Ok(Reply::Unit)
            }
            DebugCommand::Run => {
                self.exec.run_full()?;
                Ok(Reply::Unit)
            }
        }
    }
}
