//! Fragment nesting and boundary resolution, end to end.

use rpi_common::config::EngineConfig;
use rpi_net::error::LinkError;
use rpi_net::fragment::{FragmentGraph, NodeId, PortId};

use super::support::{add, as_f64, executor, inp, link, out, registry, COUNTER, IDENTITY};

/// Wrap a counter in `depth` nested fragments and expose it at every level.
fn nested_counter(graph: &mut FragmentGraph, root: NodeId, depth: usize) -> (PortId, PortId) {
    let reg = registry();
    let mut parents = vec![root];
    for level in 0..depth {
        let parent = *parents.last().unwrap();
        parents.push(graph.add_fragment(Some(parent), &format!("f{level}")).unwrap());
    }
    let counter = add(&reg, graph, *parents.last().unwrap(), "A", COUNTER);
    let leaf_out = out(graph, counter, "outValue");
    let exposed = graph.provide_out_port(root, leaf_out, "value").unwrap();
    (leaf_out, exposed)
}

#[test]
fn nesting_depth_does_not_change_boundary_identity() {
    for depth in [0, 1, 4] {
        let mut g = FragmentGraph::new();
        let root = g.add_fragment(None, "root").unwrap();
        let (leaf_out, exposed) = nested_counter(&mut g, root, depth);

        // Repeated exposure yields the very same port.
        assert_eq!(g.provide_out_port(root, leaf_out, "other").unwrap(), exposed);
        assert_eq!(g.resolve_source(exposed), Some(leaf_out));
        assert_eq!(g.node(root).out_ports(), &[exposed]);

        let exec = executor();
        let mut net = link(&registry(), &g, root, &EngineConfig::default(), &exec).unwrap();
        net.cycle(0.0);
        net.cycle(0.0);
        assert_eq!(as_f64(net.output("value")), Some(2.0), "depth {depth}");
    }
}

#[test]
fn corrected_cross_scope_link_carries_values() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let sensors = g.add_fragment(Some(root), "sensors").unwrap();
    let control = g.add_fragment(Some(root), "control").unwrap();
    let a = add(&reg, &mut g, sensors, "A", COUNTER);
    let b = add(&reg, &mut g, control, "B", IDENTITY);
    let b_in = inp(&g, b, "inValue");
    g.connect(b_in, out(&g, a, "outValue")).unwrap();

    let exec = executor();
    assert!(matches!(
        link(&reg, &g, root, &EngineConfig::default(), &exec),
        Err(LinkError::Unresolved(paths)) if paths == vec!["root/control/B.inValue".to_string()]
    ));

    g.correct_links(root).unwrap();
    assert!(g.unresolved(root).is_empty());
    // One boundary in-port on `control`, one boundary out-port on `sensors`.
    assert_eq!(g.node(control).in_ports().len(), 1);
    assert_eq!(g.node(sensors).out_ports().len(), 1);
    let forwarded = g.port(b_in).link().unwrap();
    assert_eq!(g.port(forwarded).name(), "A:outValue");
    assert_eq!(g.resolve_source(b_in), Some(out(&g, a, "outValue")));

    let b_out = out(&g, b, "outValue");
    let exposed = g.provide_out_port(control, b_out, "y").unwrap();
    g.provide_out_port(root, exposed, "y").unwrap();
    let mut net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
    net.cycle(0.0);
    assert_eq!(as_f64(net.output("y")), Some(1.0));

    // A second pass changes nothing.
    let ports_before = g.node(control).in_ports().len();
    g.correct_links(root).unwrap();
    assert_eq!(g.node(control).in_ports().len(), ports_before);
}

#[test]
fn independently_built_fragment_attaches() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let part = g.add_fragment(None, "part").unwrap();
    let a = add(&reg, &mut g, part, "A", COUNTER);
    g.provide_out_port(part, out(&g, a, "outValue"), "count").unwrap();

    let root = g.add_fragment(None, "root").unwrap();
    g.attach(root, part).unwrap();
    assert!(g.attach(root, part).is_err());
    let count = g.out_port(part, "count").unwrap();
    g.provide_out_port(root, count, "count").unwrap();

    let exec = executor();
    let mut net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
    net.cycle(0.0);
    assert_eq!(as_f64(net.output("count")), Some(1.0));
    assert_eq!(net.update_order(), vec!["root/part/A"]);
}
