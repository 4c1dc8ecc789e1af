use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::device::{DeviceContext, DeviceKind};
use crate::graph::Graph;
use crate::tensor::{numel, NdArray};

/// Resolve the context every entry lives on.
///
/// Without a `device_index` list everything goes to the first context;
/// otherwise each entry picks the first context of its device type.
pub(crate) fn entry_contexts(graph: &Graph, contexts: &[DeviceContext]) -> Result<Vec<DeviceContext>> {
    let default = *contexts
        .first()
        .ok_or_else(|| anyhow!("at least one device context is required"))?;
    graph
        .entries()
        .iter()
        .enumerate()
        .map(|(eid, entry)| match entry.device_type {
            None => Ok(default),
            Some(code) => {
                let kind = DeviceKind::from_code(code)?;
                contexts
                    .iter()
                    .copied()
                    .find(|ctx| ctx.kind == kind)
                    .ok_or_else(|| anyhow!("entry {} wants {} but no such context was given", eid, kind))
            }
        })
        .collect()
}

/// Build the entry table. Entries sharing a storage id view one pool sized
/// for the largest of them.
pub(crate) fn plan_storage(graph: &Graph, contexts: &[DeviceContext]) -> Result<Vec<NdArray>> {
    let mut pools: HashMap<usize, (usize, DeviceContext)> = HashMap::new();
    for (eid, (entry, ctx)) in graph.entries().iter().zip(contexts).enumerate() {
        let bytes = numel(&entry.shape) * entry.dtype.size_in_bytes();
        let pool = pools.entry(entry.storage_id).or_insert((0, *ctx));
        if pool.1 != *ctx {
            return Err(anyhow!(
                "entry {} shares storage {} across devices {} and {}",
                eid,
                entry.storage_id,
                pool.1,
                ctx
            ));
        }
        pool.0 = pool.0.max(bytes);
    }

    let storages = pools
        .into_iter()
        .map(|(sid, (bytes, _))| (sid, NdArray::alloc_storage(bytes)))
        .collect::<HashMap<_, _>>();

    graph
        .entries()
        .iter()
        .zip(contexts)
        .map(|(entry, ctx)| {
            let storage = storages
                .get(&entry.storage_id)
                .cloned()
                .ok_or_else(|| anyhow!("storage {} was not planned", entry.storage_id))?;
            Ok(NdArray::view(storage, &entry.shape, entry.dtype, *ctx))
        })
        .collect()
}
