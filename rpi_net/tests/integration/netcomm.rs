//! Netcomm channels and listener notifications.

use std::sync::Arc;

use parking_lot::Mutex;
use rpi_common::config::EngineConfig;
use rpi_common::consts::TERMINATE_PORT;
use rpi_common::value::Value;
use rpi_net::error::NetError;
use rpi_net::fragment::FragmentGraph;
use rpi_net::runtime::{Net, NetListener, NetStatus, NotificationExecutor};

use super::support::{add, executor, inp, link, out, registry, IDENTITY};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl NetListener for Recorder {
    fn value_changed(&self, net: &str, key: &str, value: &Value, _timestamp: f64) {
        self.events.lock().push(format!("{net}:{key}={value}"));
    }

    fn update_performed(&self, net: &str) {
        self.events.lock().push(format!("{net}:update"));
    }

    fn status_changed(&self, net: &str, status: NetStatus) {
        self.events.lock().push(format!("{net}:{status}"));
    }
}

impl Recorder {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }
}

/// `x` (inbound) → identity → `y` and `z` (outbound).
fn echo_net(config: &EngineConfig, exec: &NotificationExecutor) -> Net {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "echo").unwrap();
    let x = add(&reg, &mut g, root, "x", "Core::NetcommIn");
    g.set_parameter(x, "Key", "x").unwrap();
    let id = add(&reg, &mut g, root, "id", IDENTITY);
    g.connect(inp(&g, id, "inValue"), out(&g, x, "outValue")).unwrap();
    for key in ["y", "z"] {
        let sink = add(&reg, &mut g, root, key, "Core::NetcommOut");
        g.set_parameter(sink, "Key", key).unwrap();
        g.connect(inp(&g, sink, "inValue"), out(&g, id, "outValue")).unwrap();
    }
    let stop = add(&reg, &mut g, root, "stop", "Core::Cancel");
    g.provide_out_port(root, out(&g, stop, "outCancel"), TERMINATE_PORT)
        .unwrap();
    link(&reg, &g, root, config, exec).unwrap()
}

fn every_cycle() -> EngineConfig {
    EngineConfig {
        netcomm_report_interval_us: 0,
        ..EngineConfig::default()
    }
}

#[test]
fn identical_updates_are_reported_once() {
    let exec = executor();
    let mut net = echo_net(&every_cycle(), &exec);
    let handle = net.handle();
    let recorder = Arc::new(Recorder::default());
    handle.add_listener(recorder.clone());

    handle.write_netcomm("x", "1.5", 0.0).unwrap();
    for k in 0..5 {
        net.cycle(k as f64 * 0.001);
    }
    handle.flush_notifications();
    assert_eq!(
        recorder.take(),
        vec!["echo:running", "echo:y=1.5", "echo:z=1.5", "echo:update"]
    );

    handle.write_netcomm("x", "2", 0.1).unwrap();
    net.cycle(0.0);
    net.cycle(0.0);
    handle.flush_notifications();
    assert_eq!(recorder.take(), vec!["echo:y=2", "echo:z=2", "echo:update"]);
}

#[test]
fn every_listener_gets_the_whole_batch() {
    let exec = executor();
    let mut net = echo_net(&every_cycle(), &exec);
    let handle = net.handle();
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    handle.add_listener(first.clone());
    handle.add_listener(second.clone());

    handle.write_netcomm("x", "3", 0.0).unwrap();
    net.cycle(0.0);
    handle.flush_notifications();
    let expected = vec!["echo:running", "echo:y=3", "echo:z=3", "echo:update"];
    assert_eq!(first.take(), expected);
    assert_eq!(second.take(), expected);
}

#[test]
fn reports_are_rate_limited_but_final_state_is_flushed() {
    let exec = executor();
    // Default interval: 20 ms, i.e. one report per 20 cycles.
    let mut net = echo_net(&EngineConfig::default(), &exec);
    let handle = net.handle();
    let recorder = Arc::new(Recorder::default());
    handle.add_listener(recorder.clone());

    handle.write_netcomm("x", "1", 0.0).unwrap();
    net.cycle(10.0);
    handle.write_netcomm("x", "2", 0.0).unwrap();
    net.cycle(10.0);
    handle.flush_notifications();
    let events = recorder.take();
    assert!(events.contains(&"echo:y=1".to_string()));
    assert!(!events.contains(&"echo:y=2".to_string()));

    // Cancel terminates on the next cycle, which forces the last report.
    handle.cancel();
    net.cycle(10.0);
    handle.flush_notifications();
    assert_eq!(
        recorder.take(),
        vec!["echo:cancelling", "echo:terminated", "echo:y=2", "echo:z=2", "echo:update"]
    );
}

#[test]
fn netcomm_writes_are_checked() {
    let exec = executor();
    let mut net = echo_net(&every_cycle(), &exec);
    let handle = net.handle();
    assert_eq!(net.netcomm().keys(), vec!["x", "y", "z"]);
    assert!(matches!(
        handle.write_netcomm("x", "fast", 0.0),
        Err(NetError::Value(_))
    ));
    assert_eq!(
        handle.write_netcomm("y", "1", 0.0),
        Err(NetError::WrongDirection("y".into()))
    );
    assert_eq!(handle.read_netcomm("y").unwrap(), None);

    handle.write_netcomm("x", "4", 0.5).unwrap();
    net.cycle(7.0);
    assert_eq!(handle.read_netcomm("y").unwrap(), Some((Value::Double(4.0), 7.0)));

    net.handle().kill();
    net.unload();
    assert_eq!(
        handle.write_netcomm("x", "5", 1.0),
        Err(NetError::ChannelKilled("x".into()))
    );
    assert_eq!(handle.read_netcomm("y").unwrap(), Some((Value::Double(4.0), 7.0)));
}

#[test]
fn untyped_values_of_the_wrong_type_are_not_published() {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, "n").unwrap();
    for (key, value) in [("bad", Value::from("fast")), ("good", Value::Double(2.0))] {
        let source = add(&reg, &mut g, root, &format!("{key}_src"), "Core::Constant");
        g.set_parameter(source, "Value", value).unwrap();
        let sink = add(&reg, &mut g, root, key, "Core::NetcommOut");
        g.set_parameter(sink, "Key", key).unwrap();
        g.connect(inp(&g, sink, "inValue"), out(&g, source, "outValue")).unwrap();
    }
    let exec = executor();
    let mut net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
    let handle = net.handle();
    for k in 0..3 {
        net.cycle(k as f64 * 0.001);
    }
    assert_eq!(handle.read_netcomm("bad").unwrap(), None);
    assert_eq!(
        handle.read_netcomm("good").unwrap().map(|(v, _)| v),
        Some(Value::Double(2.0))
    );
}
