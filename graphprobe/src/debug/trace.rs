use std::fmt;
use std::time::Duration;

use serde::ser::{SerializeStruct, Serializer};

/// Kind of trace event recorded by the debug runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TraceEventKind {
    /// A single timed step.
    Step,
    /// A node executed as part of a prefix replay.
    Replay,
    /// The captured output of a prefix replay.
    Capture,
}

impl fmt::Display for TraceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEventKind::Step => write!(f, "Step"),
            TraceEventKind::Replay => write!(f, "Replay"),
            TraceEventKind::Capture => write!(f, "Capture"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    pub node_index: usize,
    pub node_name: String,
    pub micros: String,
    pub micros_parts: [u64; 3],
}

impl TraceEvent {
    pub(crate) fn new(kind: TraceEventKind, node_index: usize, node_name: &str, elapsed: Duration) -> Self {
        let (micros, micros_parts) = format_duration_ns(elapsed.as_nanos());
        Self {
            kind,
            node_index,
            node_name: node_name.to_string(),
            micros,
            micros_parts,
        }
    }
}

pub(crate) fn format_duration_ns(ns: u128) -> (String, [u64; 3]) {
    let ms = (ns / 1_000_000) as u64;
    let rem_ms = (ns % 1_000_000) as u64;
    let us = rem_ms / 1_000;
    let ns = rem_ms % 1_000;
    (format!("{}ms {}us {}ns", ms, us, ns), [ms, us, ns])
}

pub(crate) fn format_step_line(event: &TraceEvent) -> String {
    match event.kind {
        TraceEventKind::Capture => format!("{} [{}] -- {}", event.node_index, event.kind, event.node_name),
        _ => format!(
            "{} [{}] -- {} -- ({})",
            event.node_index, event.kind, event.node_name, event.micros
        ),
    }
}

impl serde::Serialize for TraceEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("TraceEvent", 4)?;
        state.serialize_field("node_index", &self.node_index)?;
        state.serialize_field("node_name", &self.node_name)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("micros", &self.micros_parts)?;
        state.end()
    }
}
