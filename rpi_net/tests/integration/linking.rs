//! Link-time failures: a net that does not link never runs.

use rpi_common::config::EngineConfig;
use rpi_common::value::ValueType;
use rpi_net::error::LinkError;
use rpi_net::fragment::{from_json, FragmentGraph, NodeId};
use rpi_net::runtime::PrimitiveRegistry;

use super::support::{add, executor, inp, link, out, registry, FLAG, IDENTITY};

fn link_err(reg: &PrimitiveRegistry, g: &FragmentGraph, root: NodeId) -> LinkError {
    let exec = executor();
    link(reg, g, root, &EngineConfig::default(), &exec).unwrap_err()
}

#[test]
fn unregistered_type() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    g.add_primitive(Some(root), "ik", "Robot::InverseKinematics")
        .unwrap();
    assert_eq!(
        link_err(&reg, &g, root),
        LinkError::UnknownType {
            path: "root/ik".into(),
            type_name: "Robot::InverseKinematics".into(),
        }
    );
}

#[test]
fn missing_and_invalid_parameters() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    add(&reg, &mut g, root, "c", "Core::Constant");
    assert!(matches!(
        link_err(&reg, &g, root),
        LinkError::MissingParameter { ref param, .. } if param == "Value"
    ));

    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let h = add(&reg, &mut g, root, "h", "Core::History");
    g.set_parameter(h, "MaxAge", -1.0).unwrap();
    assert!(matches!(
        link_err(&reg, &g, root),
        LinkError::InvalidParameter { ref param, .. } if param == "MaxAge"
    ));

    g.set_parameter(h, "MaxAge", "soon").unwrap();
    assert!(matches!(
        link_err(&reg, &g, root),
        LinkError::InvalidParameter { ref param, .. } if param == "MaxAge"
    ));

    g.set_parameter(h, "Colour", 1.0).unwrap();
    g.set_parameter(h, "MaxAge", 1.0).unwrap();
    assert!(matches!(
        link_err(&reg, &g, root),
        LinkError::UnknownParameter { ref param, .. } if param == "Colour"
    ));
}

#[test]
fn oversized_history_spans_fail_to_link() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let h = add(&reg, &mut g, root, "h", "Core::History");
    g.set_parameter(h, "MaxAge", 1e30).unwrap();
    assert!(matches!(
        link_err(&reg, &g, root),
        LinkError::InvalidParameter { ref param, .. } if param == "MaxAge"
    ));

    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let src = add(&reg, &mut g, root, "src", IDENTITY);
    let dst = add(&reg, &mut g, root, "dst", IDENTITY);
    let input = inp(&g, dst, "inValue");
    g.connect(input, out(&g, src, "outValue")).unwrap();
    g.set_debug(input, 1e30).unwrap();
    assert!(matches!(
        link_err(&reg, &g, root),
        LinkError::InvalidDebugSpan { ref port, .. } if port == "root/dst.inValue"
    ));
    g.set_debug(input, -1.0).unwrap();
    assert!(matches!(link_err(&reg, &g, root), LinkError::InvalidDebugSpan { .. }));
}

#[test]
fn undeclared_port() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let id = add(&reg, &mut g, root, "id", IDENTITY);
    g.add_in_port(id, "inExtra", ValueType::Double).unwrap();
    assert!(matches!(
        link_err(&reg, &g, root),
        LinkError::UnknownPort { ref port, .. } if port == "inExtra"
    ));
}

#[test]
fn same_cycle_loop_without_pre() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let a = add(&reg, &mut g, root, "a", IDENTITY);
    let b = add(&reg, &mut g, root, "b", IDENTITY);
    add(&reg, &mut g, root, "free", IDENTITY);
    g.connect(inp(&g, a, "inValue"), out(&g, b, "outValue")).unwrap();
    g.connect(inp(&g, b, "inValue"), out(&g, a, "outValue")).unwrap();
    assert_eq!(
        link_err(&reg, &g, root),
        LinkError::AlgebraicLoop(vec!["root/a".into(), "root/b".into()])
    );
}

#[test]
fn duplicate_netcomm_key() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    for name in ["in1", "in2"] {
        let n = add(&reg, &mut g, root, name, "Core::NetcommIn");
        g.set_parameter(n, "Key", "cmd").unwrap();
    }
    assert!(matches!(
        link_err(&reg, &g, root),
        LinkError::DuplicateNetcommKey { ref path, ref key } if path == "root/in2" && key == "cmd"
    ));
}

#[test]
fn type_mismatch_through_opaque_port() {
    // Parsed while `Test::Flag` is unknown: its port is untyped.
    let json = r#"{ "fragment": { "name": "root", "modules": [
        { "module": { "name": "flag", "type": "Test::Flag" } },
        { "module": { "name": "h", "type": "Core::History",
                      "parameters": { "MaxAge": "1.0" },
                      "ports": [ { "name": "inAge", "frommodule": "flag", "fromport": "outFlag" } ] } }
    ] } }"#;
    let (g, root) = from_json(json, &PrimitiveRegistry::with_builtins()).unwrap();
    assert_eq!(
        link_err(&registry(), &g, root),
        LinkError::TypeMismatch {
            path: "root/h".into(),
            port: "inAge".into(),
            expected: ValueType::Double,
            actual: ValueType::Bool,
        }
    );
}

#[test]
fn typed_source_must_match_channel_type() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let flag = add(&reg, &mut g, root, "flag", FLAG);
    let sink = add(&reg, &mut g, root, "out", "Core::NetcommOut");
    g.set_parameter(sink, "Key", "pos").unwrap();
    g.connect(inp(&g, sink, "inValue"), out(&g, flag, "outFlag")).unwrap();
    assert_eq!(
        link_err(&reg, &g, root),
        LinkError::TypeMismatch {
            path: "root/out".into(),
            port: "inValue".into(),
            expected: ValueType::Double,
            actual: ValueType::Bool,
        }
    );

    g.set_parameter(sink, "Type", "bool").unwrap();
    let exec = executor();
    assert!(link(&reg, &g, root, &EngineConfig::default(), &exec).is_ok());
}
