//! Net chaining through netcomm channels.

use rpi_common::config::EngineConfig;
use rpi_common::consts::TERMINATE_PORT;
use rpi_common::device::DeviceMap;
use rpi_common::value::Value;
use rpi_net::error::LinkError;
use rpi_net::fragment::{FragmentGraph, NodeId};
use rpi_net::runtime::{Linker, NetStatus, Scheduler};

use super::support::{add, executor, inp, out, registry};

/// Writes 5.0 to outbound channel `last` and terminates after one cycle.
fn predecessor() -> (FragmentGraph, NodeId) {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "N1").unwrap();
    let five = add(&reg, &mut g, root, "five", "Core::Constant");
    g.set_parameter(five, "Value", 5.0).unwrap();
    let sink = add(&reg, &mut g, root, "sink", "Core::NetcommOut");
    g.set_parameter(sink, "Key", "last").unwrap();
    g.connect(inp(&g, sink, "inValue"), out(&g, five, "outValue")).unwrap();
    let done = add(&reg, &mut g, root, "done", "Core::Constant");
    g.set_parameter(done, "Value", true).unwrap();
    g.provide_out_port(root, out(&g, done, "outValue"), TERMINATE_PORT)
        .unwrap();
    (g, root)
}

/// Reads `remote_key` of `N1` and exposes it as `start`.
fn successor(remote_net: &str, remote_key: &str) -> (FragmentGraph, NodeId) {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "N2").unwrap();
    let from = add(&reg, &mut g, root, "from", "Core::InterNetIn");
    g.set_parameter(from, "RemoteNet", remote_net).unwrap();
    g.set_parameter(from, "RemoteKey", remote_key).unwrap();
    g.provide_out_port(root, out(&g, from, "outValue"), "start").unwrap();
    (g, root)
}

#[test]
fn successor_sees_predecessor_value_on_first_cycle() {
    let reg = registry();
    let devices = DeviceMap::new();
    let config = EngineConfig::default();
    let exec = executor();
    let mut sched = Scheduler::new(config.clone(), exec.clone());

    let (g1, r1) = predecessor();
    let n1 = Linker::new(&reg, &devices, &config, exec.clone())
        .link("N1", &g1, r1)
        .unwrap();
    let h1 = sched.load(n1).unwrap();

    let (g2, r2) = successor("N1", "last");
    let n2 = Linker::new(&reg, &devices, &config, exec.clone())
        .with_predecessors(sched.netcomm_tables())
        .link("N2", &g2, r2)
        .unwrap();
    let h2 = sched.load(n2).unwrap();
    sched.set_successor("N1", "N2").unwrap();
    sched.start("N1").unwrap();

    sched.tick(1.0);
    assert_eq!(h1.status(), NetStatus::Terminated);
    assert_eq!(h2.status(), NetStatus::Ready);
    assert_eq!(h1.read_netcomm("last").unwrap(), Some((Value::Double(5.0), 1.0)));

    sched.tick(1.001);
    let n2 = sched.net("N2").unwrap();
    assert_eq!(n2.cycle_count(), 1);
    assert_eq!(n2.output("start"), Some(&Value::Double(5.0)));
    assert_eq!(h2.status(), NetStatus::Running);

    // Unloading the predecessor kills its channels, the value stays readable.
    sched.unload("N1").unwrap();
    sched.tick(1.002);
    assert_eq!(
        sched.net("N2").unwrap().output("start"),
        Some(&Value::Double(5.0))
    );
}

#[test]
fn missing_predecessor_or_key_fails_to_link() {
    let reg = registry();
    let devices = DeviceMap::new();
    let config = EngineConfig::default();
    let exec = executor();
    let mut sched = Scheduler::new(config.clone(), exec.clone());
    let (g1, r1) = predecessor();
    sched
        .load(
            Linker::new(&reg, &devices, &config, exec.clone())
                .link("N1", &g1, r1)
                .unwrap(),
        )
        .unwrap();

    let (g2, r2) = successor("N1", "first");
    let err = Linker::new(&reg, &devices, &config, exec.clone())
        .with_predecessors(sched.netcomm_tables())
        .link("N2", &g2, r2)
        .unwrap_err();
    assert!(matches!(err, LinkError::UnknownNetcommKey { ref key, .. } if key == "first"));

    let (g3, r3) = successor("N0", "last");
    let err = Linker::new(&reg, &devices, &config, exec)
        .with_predecessors(sched.netcomm_tables())
        .link("N3", &g3, r3)
        .unwrap_err();
    assert!(matches!(err, LinkError::UnknownNet { ref net, .. } if net == "N0"));
}
