//! Per-phase device locking.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use rpi_common::config::EngineConfig;
use rpi_common::consts::MAX_NET_DEVICES;
use rpi_common::device::DeviceMap;
use rpi_net::error::LinkError;
use rpi_net::fragment::FragmentGraph;
use rpi_net::runtime::{Linker, Net, NotificationExecutor, Scheduler};

use super::support::{add, executor, registry, FakeDevice, DEVICE_USER};

/// Net with one `DeviceUser` per `(sensor, actuator)` pair.
fn device_net(
    id: &str,
    users: &[(&str, &str)],
    devices: &DeviceMap,
    exec: &NotificationExecutor,
) -> Result<Net, LinkError> {
    let reg = registry();
    let mut g = FragmentGraph::new();
    let root = g.add_fragment(None, id).unwrap();
    for (i, (sensor, actuator)) in users.iter().enumerate() {
        let user = add(&reg, &mut g, root, &format!("user{i}"), DEVICE_USER);
        g.set_parameter(user, "Sensor", *sensor).unwrap();
        g.set_parameter(user, "Actuator", *actuator).unwrap();
    }
    Linker::new(&reg, devices, &EngineConfig::default(), exec.clone()).link(id, &g, root)
}

fn fake_devices(names: &[&str], log: &Arc<Mutex<Vec<String>>>) -> DeviceMap {
    let mut devices = DeviceMap::new();
    for name in names {
        devices.register(FakeDevice::new(name, log)).unwrap();
    }
    devices
}

#[test]
fn devices_lock_in_name_order_and_unlock_in_reverse() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let devices = fake_devices(&["arm", "base", "gripper"], &log);
    let exec = executor();
    let mut net = device_net(
        "n",
        &[("gripper", "base"), ("arm", "base"), ("arm", "")],
        &devices,
        &exec,
    )
    .unwrap();
    assert_eq!(
        net.devices(),
        (vec!["arm", "gripper"], vec!["base"])
    );

    net.cycle(0.0);
    assert_eq!(
        *log.lock(),
        vec![
            "arm:lock",
            "gripper:lock",
            "gripper:unlock",
            "arm:unlock",
            "base:lock",
            "base:unlock",
        ]
    );
}

/// Asserts the calls on `device` alternate strictly `lock`, `unlock`.
fn assert_paired(log: &[String], device: &str) {
    let calls: Vec<&String> = log
        .iter()
        .filter(|c| c.starts_with(&format!("{device}:")))
        .collect();
    assert!(!calls.is_empty());
    assert_eq!(calls.len() % 2, 0);
    for pair in calls.chunks(2) {
        assert_eq!(*pair[0], format!("{device}:lock"));
        assert_eq!(*pair[1], format!("{device}:unlock"));
    }
}

#[test]
fn schedulers_on_two_threads_share_a_device_exclusively() {
    const TICKS: usize = 500;
    let log = Arc::new(Mutex::new(Vec::new()));
    let devices = fake_devices(&["arm", "base"], &log);
    let exec = executor();

    thread::scope(|s| {
        for (id, users) in [
            ("a", &[("arm", "arm")][..]),
            ("b", &[("arm", "base"), ("base", "arm")][..]),
        ] {
            let devices = &devices;
            let exec = exec.clone();
            s.spawn(move || {
                let mut sched = Scheduler::new(EngineConfig::default(), exec.clone());
                sched
                    .load(device_net(id, users, devices, &exec).unwrap())
                    .unwrap();
                sched.start(id).unwrap();
                for k in 0..TICKS {
                    sched.tick(k as f64 * 0.001);
                    thread::yield_now();
                }
            });
        }
    });

    let log = log.lock();
    assert_paired(&log, "arm");
    assert_paired(&log, "base");
    // Each net holds arm once per sensor and once per actuator phase.
    let arm_locks = log.iter().filter(|c| *c == "arm:lock").count();
    assert_eq!(arm_locks, 4 * TICKS);
}

#[test]
fn unknown_device_or_class_fails_to_link() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let devices = fake_devices(&["arm"], &log);
    let exec = executor();
    let err = device_net("n", &[("leg", "")], &devices, &exec).unwrap_err();
    assert!(matches!(err, LinkError::UnknownDevice { ref device, .. } if device == "leg"));
}

#[test]
fn too_many_devices_fails_to_link() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let names: Vec<String> = (0..=MAX_NET_DEVICES).map(|i| format!("d{i:02}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let devices = fake_devices(&refs, &log);
    let users: Vec<(&str, &str)> = refs.iter().map(|n| (*n, "")).collect();
    let exec = executor();
    assert!(matches!(
        device_net("n", &users, &devices, &exec),
        Err(LinkError::TooManyDevices(n)) if n == MAX_NET_DEVICES + 1
    ));
}
