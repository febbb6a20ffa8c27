use std::sync::Arc;
use std::thread;

use station_core::{
    FileSessionStore, MemorySessionStore, ReplyStatus, SessionStage, SessionStore,
    StationWorkflow, WorkflowError,
};
use station_spec::{DeviceConfig, GatewayCheck, TopologyRegistry};

fn cfg(ip: &str, mask: &str) -> DeviceConfig {
    DeviceConfig::new(ip, mask, None::<String>)
}

fn run_training(wf: &StationWorkflow) {
    assert!(wf.start_session("trainee").unwrap());
    wf.select_mode("trainee", "C", "point-to-point").unwrap();
    wf.configure_console("trainee", "console_ac1", cfg("192.168.222.10", "255.255.255.0"))
        .unwrap();
    wf.configure_antenna("trainee", "ac1", cfg("192.168.1.1", "255.255.255.0"))
        .unwrap();
    assert!(wf.can_access_antenna("trainee", "ac1").unwrap().allowed);
}

#[test]
fn training_scenario_in_memory() {
    let wf = StationWorkflow::new(
        Arc::new(TopologyRegistry::reference()),
        Arc::new(MemorySessionStore::new()),
        GatewayCheck::Lenient,
    );
    run_training(&wf);

    let wrong = wf
        .configure_antenna("trainee", "ac1", cfg("192.168.1.2", "255.255.255.0"))
        .unwrap_err();
    assert!(wrong.to_string().contains("192.168.1.1"));
    // Rejected write leaves the earlier accepted antenna config in place.
    assert!(wf.can_access_antenna("trainee", "ac1").unwrap().allowed);

    wf.configure_console("trainee", "console_ac1", cfg("192.168.1.10", "255.255.255.0"))
        .unwrap();
    let reply = wf.check_web_access("trainee", "ac1").unwrap();
    assert_eq!(reply.status, ReplyStatus::Error);
    assert_eq!(
        reply.message,
        "console IP 192.168.1.10 is not inside subnet 192.168.222.0/24"
    );
}

#[test]
fn training_scenario_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(TopologyRegistry::reference());
    {
        let store = Arc::new(FileSessionStore::open(dir.path()).unwrap());
        let wf = StationWorkflow::new(registry.clone(), store, GatewayCheck::Lenient);
        run_training(&wf);
    }
    let store = Arc::new(FileSessionStore::open(dir.path()).unwrap());
    let wf = StationWorkflow::new(registry, store, GatewayCheck::Lenient);
    assert_eq!(wf.stage("trainee", "ac1").unwrap(), SessionStage::AccessGranted);
    assert!(!wf.start_session("trainee").unwrap());
    assert_eq!(wf.stage("trainee", "ac2").unwrap(), SessionStage::ModeSelected);
}

#[test]
fn stages_follow_the_configuration_order() {
    let wf = StationWorkflow::new(
        Arc::new(TopologyRegistry::reference()),
        Arc::new(MemorySessionStore::new()),
        GatewayCheck::Lenient,
    );
    assert_eq!(wf.stage("u", "ac2").unwrap(), SessionStage::Uninitialized);
    wf.start_session("u").unwrap();
    assert_eq!(wf.stage("u", "ac2").unwrap(), SessionStage::Started);
    wf.select_mode("u", "C", "point-to-point").unwrap();
    assert_eq!(wf.stage("u", "ac2").unwrap(), SessionStage::ModeSelected);
    wf.configure_console("u", "console_ac2", cfg("192.168.222.30", "255.255.255.0"))
        .unwrap();
    assert_eq!(wf.stage("u", "ac2").unwrap(), SessionStage::ConsoleConfigured);
    wf.configure_antenna("u", "ac2", cfg("192.168.2.1", "255.255.255.0"))
        .unwrap();
    assert_eq!(wf.stage("u", "ac2").unwrap(), SessionStage::AccessGranted);
    assert!(matches!(
        wf.stage("u", "ac7").unwrap_err(),
        WorkflowError::UnknownAntenna(_)
    ));
}

#[test]
fn concurrent_console_and_antenna_writes_do_not_clobber() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::open(dir.path()).unwrap());
    let wf = StationWorkflow::new(
        Arc::new(TopologyRegistry::reference()),
        store.clone(),
        GatewayCheck::Lenient,
    );
    wf.start_session("u").unwrap();
    wf.select_mode("u", "C", "point-to-point").unwrap();
    wf.configure_console("u", "console_ac1", cfg("192.168.222.10", "255.255.255.0"))
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let wf = wf.clone();
            thread::spawn(move || {
                if i % 2 == 0 {
                    wf.configure_antenna("u", "ac1", cfg("192.168.1.1", "255.255.255.0"))
                        .unwrap();
                } else {
                    let ip = format!("192.168.222.{}", 40 + i);
                    wf.configure_console("u", "console_ac2", cfg(&ip, "255.255.255.0"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let record = store.get_session("u").unwrap().unwrap();
    assert!(record.antenna_config("ac1").is_some());
    assert!(record.console_config("console_ac1").is_some());
    assert!(record.console_config("console_ac2").is_some());
    // Two setup writes plus eight concurrent ones.
    assert_eq!(record.version, 10);
    assert!(wf.can_access_antenna("u", "ac1").unwrap().allowed);
}
