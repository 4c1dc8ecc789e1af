//! Compiled graph description.
//!
//! A graph is a topologically ordered list of nodes. Every node owns one or
//! more output entries; entries are numbered densely through `node_row_ptr`
//! and carry the shape, dtype, storage id and device of their buffer.
mod json;

use anyhow::{anyhow, Context, Result};

use crate::error::DebugError;
use crate::kernel::NOP_FUNC;
use crate::tensor::DType;

use self::json::{attr_str, attr_usize, expect_tag, GraphJson, NodeJson};

/// Reference to one output of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef {
    pub node: usize,
    pub slot: usize,
    pub version: usize,
}

impl EntryRef {
    fn from_raw(raw: &[usize]) -> Result<Self> {
        match raw {
            [node, slot] => Ok(Self {
                node: *node,
                slot: *slot,
                version: 0,
            }),
            [node, slot, version] => Ok(Self {
                node: *node,
                slot: *slot,
                version: *version,
            }),
            _ => Err(anyhow!("entry reference must have 2 or 3 fields, got {:?}", raw)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelAttrs {
    pub func_name: String,
    pub num_inputs: usize,
    pub num_outputs: usize,
    /// Carried from the wire format for callers that inspect it; the
    /// runtime passes buffers with their entry shapes regardless.
    pub flatten_data: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOp {
    /// Graph argument or parameter; owns a buffer but runs nothing.
    Null,
    Kernel(KernelAttrs),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub index: usize,
    pub name: String,
    pub op: NodeOp,
    pub inputs: Vec<EntryRef>,
}

impl Node {
    pub fn num_outputs(&self) -> usize {
        match &self.op {
            NodeOp::Null => 1,
            NodeOp::Kernel(attrs) => attrs.num_outputs,
        }
    }

    pub fn func_name(&self) -> Option<&str> {
        match &self.op {
            NodeOp::Null => None,
            NodeOp::Kernel(attrs) => Some(attrs.func_name.as_str()),
        }
    }

    /// Whether the runtime builds a closure for this node.
    pub fn is_runnable(&self) -> bool {
        matches!(self.func_name(), Some(name) if name != NOP_FUNC)
    }
}

/// Per-entry buffer attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAttrs {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub storage_id: usize,
    pub device_type: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    arg_nodes: Vec<usize>,
    node_row_ptr: Vec<usize>,
    heads: Vec<EntryRef>,
    entries: Vec<EntryAttrs>,
}

impl Graph {
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: GraphJson = serde_json::from_str(text).context("parse graph json")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: GraphJson) -> Result<Self> {
        let nodes = raw
            .nodes
            .into_iter()
            .enumerate()
            .map(|(index, node)| parse_node(index, node))
            .collect::<Result<Vec<_>>>()?;

        let node_row_ptr = match raw.node_row_ptr {
            Some(ptr) => ptr,
            None => {
                let mut ptr = Vec::with_capacity(nodes.len() + 1);
                ptr.push(0);
                for node in &nodes {
                    let last = ptr[ptr.len() - 1];
                    ptr.push(last + node.num_outputs());
                }
                ptr
            }
        };
        if node_row_ptr.len() != nodes.len() + 1 {
            return Err(anyhow!(
                "node_row_ptr has {} rows for {} nodes",
                node_row_ptr.len(),
                nodes.len()
            ));
        }
        for (nid, node) in nodes.iter().enumerate() {
            let rows = node_row_ptr[nid + 1]
                .checked_sub(node_row_ptr[nid])
                .ok_or_else(|| anyhow!("node_row_ptr is not monotonic at node {}", nid))?;
            if rows != node.num_outputs() {
                return Err(anyhow!(
                    "node {} declares {} outputs but node_row_ptr reserves {}",
                    node.name,
                    node.num_outputs(),
                    rows
                ));
            }
        }

        let num_entries = node_row_ptr[nodes.len()];
        let attrs = raw.attrs;
        expect_tag("shape", &attrs.shape.0, "list_shape")?;
        expect_tag("dltype", &attrs.dltype.0, "list_str")?;
        expect_tag("storage_id", &attrs.storage_id.0, "list_int")?;
        let shapes = attrs.shape.1;
        let dtypes = attrs.dltype.1;
        let storage_ids = attrs.storage_id.1;
        let device_types = match attrs.device_index {
            Some((tag, values)) => {
                expect_tag("device_index", &tag, "list_int")?;
                Some(values)
            }
            None => None,
        };
        for (field, len) in [
            ("shape", shapes.len()),
            ("dltype", dtypes.len()),
            ("storage_id", storage_ids.len()),
            ("device_index", device_types.as_ref().map_or(num_entries, Vec::len)),
        ] {
            if len != num_entries {
                return Err(anyhow!(
                    "graph attr {} has {} values for {} entries",
                    field,
                    len,
                    num_entries
                ));
            }
        }
        let entries = shapes
            .into_iter()
            .zip(dtypes)
            .zip(storage_ids)
            .enumerate()
            .map(|(eid, ((shape, dtype), storage_id))| {
                Ok(EntryAttrs {
                    shape,
                    dtype: DType::from_name(&dtype)?,
                    storage_id,
                    device_type: device_types.as_ref().map(|types| types[eid]),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let heads = raw
            .heads
            .iter()
            .map(|raw| EntryRef::from_raw(raw))
            .collect::<Result<Vec<_>>>()?;

        let graph = Self {
            nodes,
            arg_nodes: raw.arg_nodes,
            node_row_ptr,
            heads,
            entries,
        };
        graph.validate_refs()?;
        Ok(graph)
    }

    fn validate_refs(&self) -> Result<()> {
        for node in &self.nodes {
            for input in &node.inputs {
                if input.node >= node.index {
                    return Err(anyhow!(
                        "node {} reads node {} which does not precede it",
                        node.name,
                        input.node
                    ));
                }
                self.entry_id(input.node, input.slot)?;
            }
            if let NodeOp::Kernel(attrs) = &node.op {
                if attrs.num_outputs == 0 {
                    return Err(anyhow!("node {} declares no outputs", node.name));
                }
                if attrs.num_inputs != node.inputs.len() {
                    return Err(anyhow!(
                        "node {} declares {} inputs but lists {}",
                        node.name,
                        attrs.num_inputs,
                        node.inputs.len()
                    ));
                }
            }
        }
        for &nid in &self.arg_nodes {
            self.node(nid)?;
        }
        for head in &self.heads {
            self.entry_id(head.node, head.slot)?;
        }
        Ok(())
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, nid: usize) -> Result<&Node> {
        self.nodes.get(nid).ok_or_else(|| {
            DebugError::NodeOutOfRange {
                index: nid,
                count: self.nodes.len(),
            }
            .into()
        })
    }

    pub fn arg_nodes(&self) -> &[usize] {
        &self.arg_nodes
    }

    pub fn heads(&self) -> &[EntryRef] {
        &self.heads
    }

    pub fn entry(&self, eid: usize) -> Option<&EntryAttrs> {
        self.entries.get(eid)
    }

    pub fn entries(&self) -> &[EntryAttrs] {
        &self.entries
    }

    /// Entry id of output `slot` of node `nid`.
    pub fn entry_id(&self, nid: usize, slot: usize) -> Result<usize> {
        let node = self.node(nid)?;
        let count = node.num_outputs();
        if slot >= count {
            return Err(DebugError::OutputSlotOutOfRange {
                node: nid,
                slot,
                count,
            }
            .into());
        }
        Ok(self.node_row_ptr[nid] + slot)
    }
}

fn parse_node(index: usize, raw: NodeJson) -> Result<Node> {
    let inputs = raw
        .inputs
        .iter()
        .map(|entry| EntryRef::from_raw(entry))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("inputs of node {}", raw.name))?;
    let op = if raw.op == "null" {
        NodeOp::Null
    } else {
        let func_name = attr_str(&raw.attrs, "func_name")
            .ok_or_else(|| anyhow!("node {} has no func_name", raw.name))?
            .to_string();
        let num_inputs = attr_usize(&raw.attrs, "num_inputs")?.unwrap_or(inputs.len());
        let num_outputs = attr_usize(&raw.attrs, "num_outputs")?.unwrap_or(1);
        let flatten_data = attr_usize(&raw.attrs, "flatten_data")?.unwrap_or(0) != 0;
        NodeOp::Kernel(KernelAttrs {
            func_name,
            num_inputs,
            num_outputs,
            flatten_data,
        })
    };
    Ok(Node {
        index,
        name: raw.name,
        op,
        inputs,
    })
}

pub fn describe_node(node: &Node) -> String {
    let inputs = node
        .inputs
        .iter()
        .map(|entry| format!("{}:{}", entry.node, entry.slot))
        .collect::<Vec<_>>()
        .join(",");
    match &node.op {
        NodeOp::Null => format!("arg {}", node.name),
        NodeOp::Kernel(attrs) => format!("op {} {}({})", node.name, attrs.func_name, inputs),
    }
}
