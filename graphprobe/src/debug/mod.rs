//! Debug layer over an [`ExecutorFacade`].
//!
//! Times single operators behind a device barrier, benchmarks the whole
//! operator list with an adaptive iteration count, and replays graph
//! prefixes to capture intermediate buffers. One caller drives a runtime at
//! a time; every operation mutates the executor's buffers.
mod bench;
mod command;
mod observer;
mod trace;

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::error::DebugError;
use crate::runtime::ExecutorFacade;
use crate::tensor::NdArray;

pub use bench::{next_number, BenchmarkConfig, GROWTH_FACTOR};
pub use command::{DebugCommand, NodeRef, Reply};
pub use observer::{LogObserver, RoundLog, RoundObserver, RoundSample, RoundSummary};
pub use trace::{TraceEvent, TraceEventKind};

use self::trace::format_step_line;

#[derive(Debug)]
pub struct DebugRuntime<E> {
    exec: E,
    trace_enabled: bool,
    trace_events: Vec<TraceEvent>,
}

impl<E: ExecutorFacade> DebugRuntime<E> {
    pub fn new(exec: E) -> Self {
        Self {
            exec,
            trace_enabled: false,
            trace_events: Vec::new(),
        }
    }

    /// Record a trace event for every timed step and replayed node.
    ///
    /// Events accumulate until the caller drains them with
    /// [`DebugRuntime::take_trace_events`]; nothing is dropped.
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn executor(&self) -> &E {
        &self.exec
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.exec
    }

    pub fn into_inner(self) -> E {
        self.exec
    }

    pub fn trace_events(&self) -> &[TraceEvent] {
        &self.trace_events
    }

    pub fn take_trace_events(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.trace_events)
    }

    fn check_operator(&self, index: usize) -> Result<()> {
        let count = self.exec.operator_count();
        if index >= count {
            return Err(DebugError::OperatorOutOfRange { index, count }.into());
        }
        Ok(())
    }

    fn record(&mut self, kind: TraceEventKind, index: usize, elapsed: Duration) {
        if !self.trace_enabled {
            return;
        }
        let name = self.exec.node_name(index).unwrap_or("<unnamed>");
        let event = TraceEvent::new(kind, index, name, elapsed);
        crate::trace!("{}", format_step_line(&event));
        self.trace_events.push(event);
    }

    /// Run operator `index` once and return the seconds elapsed until its
    /// device barrier returned. A slot without a closure does no work and
    /// reports zero.
    pub fn debug_run(&mut self, index: usize) -> Result<f64> {
        self.check_operator(index)?;
        if !self.exec.has_operator(index) {
            return Ok(0.0);
        }
        let ctx = self.exec.context_of(index)?;
        let start = Instant::now();
        self.exec.execute_at(index)?;
        self.exec.synchronize(ctx)?;
        let elapsed = start.elapsed();
        self.record(TraceEventKind::Step, index, elapsed);
        Ok(elapsed.as_secs_f64())
    }

    /// Handle to output `slot` of `node`. Nothing is executed.
    pub fn get_output_by_layer(&self, node: usize, slot: usize) -> Result<NdArray> {
        self.exec.buffer_at(node, slot)
    }

    /// Replay the graph up to `node` inclusive and copy its first output
    /// into `dest`. Names resolve through [`DebugRuntime::node_index`], so an
    /// unknown name is fatal.
    pub fn debug_get_output(&mut self, node: impl Into<NodeRef>, dest: &NdArray) -> Result<()> {
        let index = match node.into() {
            NodeRef::Index(index) => index,
            NodeRef::Name(name) => self.node_index(&name),
        };
        self.debug_get_node_output(index, dest)
    }

    /// Replay operators `0..=index` and copy entry `(index, 0)` into `dest`.
    /// Operators after `index` do not run.
    pub fn debug_get_node_output(&mut self, index: usize, dest: &NdArray) -> Result<()> {
        self.check_operator(index)?;
        for step in 0..=index {
            if !self.exec.has_operator(step) {
                continue;
            }
            let start = Instant::now();
            self.exec.execute_at(step)?;
            self.record(TraceEventKind::Replay, step, start.elapsed());
        }

        let src = self.exec.buffer_at(index, 0)?;
        self.exec.synchronize(src.context())?;
        src.copy_to(dest)?;
        self.record(TraceEventKind::Capture, index, Duration::ZERO);
        Ok(())
    }

    /// Index of the first node named `name`.
    ///
    /// # Panics
    ///
    /// Panics when no node has that name; callers treat the index as always
    /// valid. Use [`DebugRuntime::try_node_index`] to recover instead.
    pub fn node_index(&self, name: &str) -> usize {
        match self.try_node_index(name) {
            Ok(index) => index,
            Err(err) => {
                crate::critical!("{}", err);
                panic!("{}", err);
            }
        }
    }

    pub fn try_node_index(&self, name: &str) -> Result<usize> {
        (0..self.exec.node_count())
            .find(|&nid| matches!(self.exec.node_name(nid), Ok(candidate) if candidate == name))
            .ok_or_else(|| DebugError::NodeNotFound(name.to_string()).into())
    }
}
