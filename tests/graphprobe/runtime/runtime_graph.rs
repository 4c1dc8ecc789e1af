use anyhow::Result;
use graphprobe::{CpuModule, DebugError, DeviceContext, ExecutorFacade, Graph, GraphRuntime, NdArray, NodeOp};
use serde_json::json;

use crate::common;

/// `out = -(relu(data) + bias)` with numeric node attrs and no
/// `node_row_ptr`, as older writers emit it.
fn residual_graph() -> serde_json::Value {
    json!({
        "nodes": [
            { "op": "null", "name": "data", "inputs": [] },
            { "op": "null", "name": "bias", "inputs": [] },
            {
                "op": "cvm_op",
                "name": "act",
                "attrs": { "func_name": "relu", "num_inputs": 1, "num_outputs": 1 },
                "inputs": [[0, 0]]
            },
            {
                "op": "cvm_op",
                "name": "sum",
                "attrs": { "func_name": "elemwise_add", "num_inputs": 2, "num_outputs": 1 },
                "inputs": [[2, 0, 0], [1, 0, 0]]
            },
            {
                "op": "cvm_op",
                "name": "out",
                "param": { "func_name": "negative", "num_inputs": "1", "num_outputs": "1", "flatten_data": true },
                "inputs": [[3, 0, 0]]
            }
        ],
        "arg_nodes": [0, 1],
        "heads": [[4, 0, 0]],
        "attrs": {
            "shape": ["list_shape", [[2, 3], [2, 3], [2, 3], [2, 3], [2, 3]]],
            "dltype": ["list_str", ["float32", "float32", "float32", "float32", "float32"]],
            "storage_id": ["list_int", [0, 1, 2, 3, 4]]
        }
    })
}

fn load(graph: &serde_json::Value) -> Result<GraphRuntime> {
    GraphRuntime::new(&graph.to_string(), CpuModule::new().into_shared(), &[DeviceContext::cpu(0)])
}

#[test]
fn full_run_matches_host_reference() -> Result<()> {
    let mut runtime = load(&residual_graph())?;
    let data = common::random_values(21, 6);
    let bias = common::random_values(22, 6);
    runtime.set_input_by_name("data", &NdArray::from_slice(&data, &[2, 3], DeviceContext::cpu(0))?)?;
    runtime.set_input_by_name("bias", &NdArray::from_slice(&bias, &[2, 3], DeviceContext::cpu(0))?)?;
    runtime.run()?;

    let expected = data
        .iter()
        .zip(&bias)
        .map(|(x, b)| -(x.max(0.0) + b))
        .collect::<Vec<_>>();
    let out = runtime.get_output(0)?;
    assert_eq!(out.shape(), &[2usize, 3]);
    common::assert_close(&out.to_vec::<f32>()?, &expected)?;
    Ok(())
}

#[test]
fn graph_shape_is_derived_from_json() -> Result<()> {
    let graph = Graph::from_json(&residual_graph().to_string())?;
    assert_eq!(graph.num_nodes(), 5);
    assert_eq!(graph.num_entries(), 5);
    assert_eq!(graph.arg_nodes(), &[0usize, 1]);
    assert_eq!(graph.entry_id(3, 0)?, 3);
    assert!(matches!(graph.nodes()[0].op, NodeOp::Null));
    match &graph.nodes()[4].op {
        NodeOp::Kernel(attrs) => {
            assert_eq!(attrs.func_name, "negative");
            assert!(attrs.flatten_data);
        }
        NodeOp::Null => panic!("node 4 should be a kernel"),
    }
    assert_eq!(graph.nodes()[3].inputs[1].node, 1);
    assert_eq!(graphprobe::describe_node(&graph.nodes()[3]), "op sum elemwise_add(2:0,1:0)");
    Ok(())
}

#[test]
fn runtime_reports_inputs_outputs_and_operators() -> Result<()> {
    let runtime = load(&residual_graph())?;
    assert_eq!(runtime.num_inputs(), 2);
    assert_eq!(runtime.num_outputs(), 1);
    assert_eq!(runtime.input_index("bias"), Some(1));
    assert_eq!(runtime.input_index("act"), None);
    assert_eq!(runtime.operator_count(), 5);
    assert_eq!(
        (0..5).map(|i| runtime.has_operator(i)).collect::<Vec<_>>(),
        vec![false, false, true, true, true]
    );
    assert_eq!(runtime.node_name(2)?, "act");
    assert!(runtime.get_input(2).is_err());
    assert!(runtime.get_output(1).is_err());
    Ok(())
}

#[test]
fn unknown_input_name_is_rejected() -> Result<()> {
    let mut runtime = load(&residual_graph())?;
    let value = NdArray::from_slice(&[0.0f32; 6], &[2, 3], DeviceContext::cpu(0))?;
    let err = runtime.set_input_by_name("weights", &value).unwrap_err();
    assert!(err.to_string().contains("weights"));
    Ok(())
}

#[test]
fn nop_nodes_get_no_closure() -> Result<()> {
    let mut graph = residual_graph();
    graph["nodes"][4]["param"]["func_name"] = json!(graphprobe::NOP_FUNC);
    let mut runtime = load(&graph)?;
    assert!(!runtime.has_operator(4));
    runtime.execute_at(4)?;
    Ok(())
}

#[test]
fn missing_function_fails_at_load() {
    let mut graph = residual_graph();
    graph["nodes"][2]["attrs"]["func_name"] = json!("fused_conv2d");
    let err = load(&graph).unwrap_err();
    assert!(err.to_string().contains("fused_conv2d"));
}

#[test]
fn kernel_failure_names_the_node() -> Result<()> {
    let json = common::chain_graph_json(&["broken"], 2);
    let module = CpuModule::new().with_kernel("broken", |_: &[NdArray]| Err(anyhow::anyhow!("boom")));
    let mut runtime = GraphRuntime::new(&json, module.into_shared(), &[DeviceContext::cpu(0)])?;
    let err = runtime.run().unwrap_err();
    assert_eq!(err.to_string(), "node layer1 failed");
    assert_eq!(err.root_cause().to_string(), "boom");
    Ok(())
}

fn assert_rejected(label: &str, mutate: impl FnOnce(&mut serde_json::Value)) {
    let mut graph = residual_graph();
    mutate(&mut graph);
    assert!(Graph::from_json(&graph.to_string()).is_err(), "{label} was accepted");
}

#[test]
fn malformed_graphs_are_rejected() {
    assert_rejected("bad shape tag", |g| g["attrs"]["shape"][0] = json!("list_int"));
    assert_rejected("short dltype", |g| g["attrs"]["dltype"] = json!(["list_str", ["float32"]]));
    assert_rejected("unknown dtype", |g| g["attrs"]["dltype"][1][2] = json!("bfloat7"));
    assert_rejected("forward input", |g| g["nodes"][2]["inputs"] = json!([[3, 0]]));
    assert_rejected("bad slot", |g| g["nodes"][2]["inputs"] = json!([[0, 1]]));
    assert_rejected("input count", |g| g["nodes"][3]["attrs"]["num_inputs"] = json!(3));
    assert_rejected("row ptr", |g| g["node_row_ptr"] = json!([0, 1, 2, 3, 4]));
    assert_rejected("head", |g| g["heads"] = json!([[9, 0, 0]]));
    assert_rejected("arg node", |g| g["arg_nodes"] = json!([0, 7]));
    assert_rejected("no func", |g| {
        if let Some(attrs) = g["nodes"][2]["attrs"].as_object_mut() {
            attrs.remove("func_name");
        }
    });
    assert!(Graph::from_json("{ not json").is_err());
}

#[test]
fn entry_lookups_are_bounds_checked() -> Result<()> {
    let graph = Graph::from_json(&residual_graph().to_string())?;
    let err = graph.entry_id(5, 0).unwrap_err();
    assert_eq!(
        err.downcast_ref::<DebugError>(),
        Some(&DebugError::NodeOutOfRange { index: 5, count: 5 })
    );
    assert!(graph.entry(5).is_none());
    Ok(())
}

#[test]
fn kernel_without_outputs_is_rejected_at_load() {
    let mut graph = common::chain_graph_value(&["relu"], 2);
    graph["nodes"][1]["attrs"]["num_outputs"] = json!("0");
    graph["node_row_ptr"] = json!([0, 1, 1]);
    graph["heads"] = json!([[0, 0, 0]]);
    graph["attrs"]["shape"] = json!(["list_shape", [[2]]]);
    graph["attrs"]["dltype"] = json!(["list_str", ["float32"]]);
    graph["attrs"]["storage_id"] = json!(["list_int", [0]]);
    let err = Graph::from_json(&graph.to_string()).unwrap_err();
    assert!(err.to_string().contains("layer1 declares no outputs"), "{err}");
}

#[test]
fn runtimes_print_a_summary() -> Result<()> {
    let runtime = load(&residual_graph())?;
    let printed = format!("{runtime:?}");
    assert!(printed.starts_with("GraphRuntime"));
    assert!(printed.contains("runnable: 3"), "{printed}");

    let debug = graphprobe::DebugRuntime::new(runtime);
    assert!(format!("{debug:?}").contains("DebugRuntime"));
    Ok(())
}
