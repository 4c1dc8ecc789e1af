//! Wire layout of a serialized graph.
use std::collections::HashMap;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct GraphJson {
    pub nodes: Vec<NodeJson>,
    #[serde(default)]
    pub arg_nodes: Vec<usize>,
    #[serde(default)]
    pub node_row_ptr: Option<Vec<usize>>,
    #[serde(default)]
    pub heads: Vec<Vec<usize>>,
    pub attrs: GraphAttrsJson,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NodeJson {
    pub op: String,
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Vec<usize>>,
    #[serde(default, alias = "attr", alias = "param")]
    pub attrs: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphAttrsJson {
    pub shape: (String, Vec<Vec<usize>>),
    pub dltype: (String, Vec<String>),
    pub storage_id: (String, Vec<usize>),
    #[serde(default)]
    pub device_index: Option<(String, Vec<i64>)>,
}

pub(crate) fn expect_tag(field: &str, tag: &str, expected: &str) -> Result<()> {
    if tag != expected {
        return Err(anyhow!(
            "graph attr {} must be tagged {}, got {}",
            field,
            expected,
            tag
        ));
    }
    Ok(())
}

/// Node attrs come as numbers or as decimal strings depending on the writer.
pub(crate) fn attr_usize(attrs: &HashMap<String, Value>, key: &str) -> Result<Option<usize>> {
    let Some(value) = attrs.get(key) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(num) => num.as_u64().map(|v| v as usize),
        Value::String(text) => text.trim().parse::<usize>().ok(),
        Value::Bool(flag) => Some(usize::from(*flag)),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| anyhow!("attr {} is not an unsigned integer: {}", key, value))
}

pub(crate) fn attr_str<'a>(attrs: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(Value::as_str)
}
