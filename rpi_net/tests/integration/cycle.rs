//! Cycle semantics: same-cycle visibility, logical time, delay and the
//! cancel/kill lifecycle.

use rpi_common::config::EngineConfig;
use rpi_common::consts::TERMINATE_PORT;
use rpi_common::value::Value;
use rpi_net::fragment::FragmentGraph;
use rpi_net::runtime::NetStatus;

use super::support::{add, as_f64, executor, inp, link, out, registry, COUNTER, IDENTITY};

#[test]
fn nested_output_reads_current_cycle() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let f = g.add_fragment(Some(root), "F").unwrap();
    let a = add(&reg, &mut g, f, "A", COUNTER);
    let b = add(&reg, &mut g, f, "B", IDENTITY);
    g.connect(inp(&g, b, "inValue"), out(&g, a, "outValue")).unwrap();
    let out1 = g.provide_out_port(f, out(&g, b, "outValue"), "out1").unwrap();
    g.provide_out_port(root, out1, "out1").unwrap();

    let exec = executor();
    let mut net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
    assert_eq!(net.update_order(), vec!["root/F/A", "root/F/B"]);
    assert_eq!(net.output("out1"), None);
    for k in 1..=3u64 {
        net.cycle(100.0 + k as f64);
        assert_eq!(net.cycle_count(), k);
        assert_eq!(as_f64(net.output("out1")), Some(k as f64));
    }
}

#[test]
fn unwritten_source_reads_absent() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let a = add(&reg, &mut g, root, "A", COUNTER);
    g.set_parameter(a, "Every", 2i64).unwrap();
    let b = add(&reg, &mut g, root, "B", IDENTITY);
    g.connect(inp(&g, b, "inValue"), out(&g, a, "outValue")).unwrap();
    g.provide_out_port(root, out(&g, b, "outValue"), "y").unwrap();

    let exec = executor();
    let mut net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
    let mut seen = Vec::new();
    for _ in 0..4 {
        net.cycle(0.0);
        seen.push(as_f64(net.output("y")));
    }
    // The value written at cycle 2 is not visible at cycle 3.
    assert_eq!(seen, vec![None, Some(2.0), None, Some(4.0)]);
}

#[test]
fn logical_time_advances_by_cycle_time() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    add(&reg, &mut g, root, "A", COUNTER);

    let config = EngineConfig {
        cycle_time_us: 2000,
        ..EngineConfig::default()
    };
    let exec = executor();
    let mut net = link(&reg, &g, root, &config, &exec).unwrap();
    net.cycle(50.0);
    assert_eq!(net.time(), 50.0);
    // Wall time jumps are ignored after the first cycle.
    net.cycle(50.5);
    net.cycle(49.0);
    net.cycle(80.0);
    assert!((net.time() - 50.006).abs() < 1e-9);
}

#[test]
fn pre_republishes_previous_cycle() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let a = add(&reg, &mut g, root, "A", COUNTER);
    let pre = add(&reg, &mut g, root, "pre", "Core::Pre");
    g.connect(inp(&g, pre, "inValue"), out(&g, a, "outValue")).unwrap();
    g.provide_out_port(root, out(&g, pre, "outValue"), "prev").unwrap();

    let exec = executor();
    let mut net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
    net.cycle(0.0);
    assert_eq!(net.output("prev"), None);
    for k in 2..=5u64 {
        net.cycle(0.0);
        assert_eq!(as_f64(net.output("prev")), Some((k - 1) as f64));
    }
}

#[test]
fn pre_delays_sensor_input_in_any_declaration_order() {
    for pre_first in [true, false] {
        let reg = registry();
        let mut g = FragmentGraph::new();
        let root = g.add_fragment(None, "root").unwrap();
        let (pre, cmd) = if pre_first {
            let pre = add(&reg, &mut g, root, "pre", "Core::Pre");
            (pre, add(&reg, &mut g, root, "cmd", "Core::NetcommIn"))
        } else {
            let cmd = add(&reg, &mut g, root, "cmd", "Core::NetcommIn");
            (add(&reg, &mut g, root, "pre", "Core::Pre"), cmd)
        };
        g.set_parameter(cmd, "Key", "x").unwrap();
        g.connect(inp(&g, pre, "inValue"), out(&g, cmd, "outValue")).unwrap();
        g.provide_out_port(root, out(&g, pre, "outValue"), "prev").unwrap();

        let exec = executor();
        let mut net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
        net.handle().write_netcomm("x", "3", 0.0).unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            net.cycle(0.0);
            seen.push(as_f64(net.output("prev")));
        }
        assert_eq!(
            seen,
            vec![None, Some(3.0), Some(3.0), Some(3.0)],
            "pre declared first: {pre_first}"
        );
    }
}

#[test]
fn feedback_through_pre_links() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let seed = add(&reg, &mut g, root, "seed", "Core::Constant");
    g.set_parameter(seed, "Value", 7.0).unwrap();
    let hold = add(&reg, &mut g, root, "hold", IDENTITY);
    let pre = add(&reg, &mut g, root, "pre", "Core::Pre");
    g.connect(inp(&g, pre, "inValue"), out(&g, hold, "outValue")).unwrap();
    g.connect(inp(&g, hold, "inValue"), out(&g, pre, "outValue")).unwrap();
    g.provide_out_port(root, out(&g, seed, "outValue"), "seed").unwrap();

    let exec = executor();
    let net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
    let order = net.update_order();
    let pos = |p: &str| order.iter().position(|o| *o == p).unwrap();
    assert!(pos("root/pre") < pos("root/hold"));
}

#[test]
fn history_follows_age_fallback() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let a = add(&reg, &mut g, root, "A", COUNTER);
    let h = add(&reg, &mut g, root, "hist", "Core::History");
    g.set_parameter(h, "MaxAge", 0.002).unwrap();
    g.set_parameter(h, "Age", 0.001).unwrap();
    g.connect(inp(&g, h, "inValue"), out(&g, a, "outValue")).unwrap();
    g.provide_out_port(root, out(&g, h, "outValue"), "past").unwrap();

    let exec = executor();
    let mut net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
    for _ in 0..5 {
        net.cycle(0.0);
    }
    assert_eq!(as_f64(net.output("past")), Some(4.0));
}

#[test]
fn cancel_terminates_through_cancel_primitive() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    let c = add(&reg, &mut g, root, "cancel", "Core::Cancel");
    g.provide_out_port(root, out(&g, c, "outCancel"), TERMINATE_PORT)
        .unwrap();

    let exec = executor();
    let mut net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
    let handle = net.handle();
    assert_eq!(handle.status(), NetStatus::Ready);
    net.cycle(0.0);
    assert_eq!(handle.status(), NetStatus::Running);
    assert_eq!(net.output(TERMINATE_PORT), Some(&Value::Bool(false)));

    assert!(handle.cancel());
    assert_eq!(handle.status(), NetStatus::Cancelling);
    net.cycle(0.0);
    assert_eq!(handle.status(), NetStatus::Terminated);
    assert!(!handle.kill());

    let cycles = net.cycle_count();
    net.cycle(0.0);
    assert_eq!(net.cycle_count(), cycles);
}

#[test]
fn killed_net_stops_cycling() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "root").unwrap();
    add(&reg, &mut g, root, "A", COUNTER);

    let exec = executor();
    let mut net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
    net.cycle(0.0);
    assert!(net.handle().kill());
    net.cycle(0.0);
    net.cycle(0.0);
    assert_eq!(net.cycle_count(), 1);
    assert_eq!(net.status(), NetStatus::Killed);
    assert!(net.unload());
    assert!(!net.unload());
    assert_eq!(net.status(), NetStatus::Unloaded);
}
