use assert_cmd::prelude::*;
use std::fs::File;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

use station_spec::{AntennaSpec, TopologySpec};

#[test]
fn devices_lists_reference_topology() -> Result<(), Box<dyn std::error::Error>> {
    let output = Command::cargo_bin("stationd")?.arg("devices").output()?;
    assert!(output.status.success());
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(listed["antennas"], serde_json::json!(["ac1", "ac2"]));
    assert_eq!(listed["consoles"], serde_json::json!(["console_ac1", "console_ac2"]));
    assert_eq!(listed["serial_suffixes"]["ac2"], "25");
    Ok(())
}

#[test]
fn devices_reads_topology_file() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let path = temp.path().join("topology.json");
    let table = TopologySpec {
        antennas: vec![AntennaSpec {
            id: "ac3".into(),
            fixed_ip: "192.168.3.1".into(),
            allowed_gateways: vec!["192.168.222.222".into(), "10.0.0.135".into()],
            serial_suffix: Some("35".into()),
        }],
    };
    File::create(&path)?.write_all(serde_json::to_string(&table)?.as_bytes())?;

    let output = Command::cargo_bin("stationd")?
        .arg("--topology")
        .arg(&path)
        .arg("devices")
        .output()?;
    assert!(output.status.success());
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(listed["consoles"], serde_json::json!(["console_ac3"]));
    assert_eq!(listed["serial_suffixes"], serde_json::json!({"ac3": "35"}));
    Ok(())
}

#[test]
fn malformed_topology_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let path = temp.path().join("topology.json");
    File::create(&path)?.write_all(br#"{"antennas": [{"id": "ac1"}]}"#)?;

    let output = Command::cargo_bin("stationd")?
        .arg("--topology")
        .arg(&path)
        .arg("devices")
        .output()?;
    assert!(!output.status.success());
    Ok(())
}
