//! Serialized nets: load from JSON, run, write back.

use rpi_common::config::EngineConfig;
use rpi_common::value::Value;
use rpi_net::fragment::codec::to_document;
use rpi_net::fragment::{from_json, to_json, NetDocument};
use rpi_net::runtime::NetStatus;

use super::support::{executor, link, registry};

const NET: &str = r#"{
  "fragment": {
    "name": "move",
    "outports": [
      { "name": "terminate", "type": "bool", "frommodule": "stop", "fromport": "outCancel" }
    ],
    "modules": [
      { "module": { "name": "count", "type": "Test::Counter", "parameters": { "Every": "1" } } },
      { "fragment": {
          "name": "filter",
          "inports": [
            { "name": "raw", "type": "double", "frommodule": "count", "fromport": "outValue" }
          ],
          "outports": [
            { "name": "smooth", "type": "any", "frommodule": "delay", "fromport": "outValue" }
          ],
          "modules": [
            { "module": { "name": "delay", "type": "Core::Pre",
                          "ports": [ { "name": "inValue", "frommodule": "", "fromport": "raw", "debug": 0.0045 } ] } }
          ] } },
      { "module": { "name": "out", "type": "Core::NetcommOut",
                    "parameters": { "Key": "pos", "Type": "double" },
                    "ports": [ { "name": "inValue", "frommodule": "filter", "fromport": "smooth" } ] } },
      { "module": { "name": "stop", "type": "Core::Cancel" } }
    ]
  }
}"#;

#[test]
fn serialized_net_links_and_runs() {
    let reg = registry();
    let (g, root) = from_json(NET, &reg).unwrap();
    let exec = executor();
    let mut net = link(&reg, &g, root, &EngineConfig::default(), &exec).unwrap();
    assert_eq!(net.id(), "move");
    assert_eq!(net.update_order(), vec!["move/count", "move/filter/delay", "move/out", "move/stop"]);

    for k in 0..8 {
        net.cycle(1.0 + k as f64);
    }
    let handle = net.handle();
    assert_eq!(handle.read_netcomm("pos").unwrap().map(|(v, _)| v), Some(Value::Double(7.0)));

    // Probe keeps 4.5 ms rounded up to 5 cycles, oldest first.
    let probe = net.probe("move/filter/delay.inValue").unwrap();
    let values: Vec<f64> = probe
        .samples()
        .iter()
        .filter_map(|(_, v)| v.as_ref().and_then(Value::as_f64))
        .collect();
    assert_eq!(values, vec![4.0, 5.0, 6.0, 7.0, 8.0]);

    handle.cancel();
    net.cycle(0.0);
    assert_eq!(handle.status(), NetStatus::Terminated);
}

#[test]
fn serialized_net_round_trips() {
    let reg = registry();
    let (g, root) = from_json(NET, &reg).unwrap();
    let json = to_json(&g, root).unwrap();
    let (g2, root2) = from_json(&json, &reg).unwrap();
    assert_eq!(to_json(&g2, root2).unwrap(), json);

    let original: NetDocument = serde_json::from_str(NET).unwrap();
    assert_eq!(to_document(&g, root).unwrap(), original);
}
