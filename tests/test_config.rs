use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use localpod::config::Config;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.control.listen_addr, "127.0.0.1:2700");
    assert_eq!(cfg.state_path, PathBuf::from("storage.yaml"));
    assert!(cfg.tls.enabled);
    assert_eq!(cfg.tls.hosts, vec!["localhost".to_string()]);
    assert_eq!(cfg.pod_bind_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(cfg.control_host(), "localhost:2700");
}

#[test]
fn test_config_partial_yaml_keeps_defaults() {
    let cfg = Config::from_yaml_str(
        "control:\n  listen_addr: 127.0.0.1:9000\nstate_path: /var/lib/localpod/state.yaml\n",
    )
    .unwrap();

    assert_eq!(cfg.control.listen_addr, "127.0.0.1:9000");
    assert_eq!(cfg.control_host(), "localhost:9000");
    assert_eq!(cfg.state_path, PathBuf::from("/var/lib/localpod/state.yaml"));
    assert!(cfg.tls.enabled);
}

#[test]
fn test_config_full_yaml() {
    let cfg = Config::from_yaml_str(
        r#"
control:
  listen_addr: 0.0.0.0:2700
  allowed_host: pods.lan:2700
tls:
  enabled: false
  hosts: [pods.lan]
pod_bind_ip: 0.0.0.0
"#,
    )
    .unwrap();

    assert_eq!(cfg.control_host(), "pods.lan:2700");
    assert!(!cfg.tls.enabled);
    assert_eq!(cfg.tls.hosts, vec!["pods.lan".to_string()]);
    assert_eq!(cfg.pod_bind_ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
}

#[test]
fn test_config_empty_yaml_is_default() {
    assert_eq!(Config::from_yaml_str("  \n").unwrap(), Config::default());
}

#[test]
fn test_config_rejects_malformed_yaml() {
    assert!(Config::from_yaml_str("control: [not, a, map]").is_err());
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("localpod.yaml");
    std::fs::write(&path, "tls:\n  enabled: false\n").unwrap();

    let cfg = Config::from_file(&path).unwrap();
    assert!(!cfg.tls.enabled);

    assert!(Config::from_file(&dir.path().join("missing.yaml")).is_err());
}

// All environment manipulation lives in one test so parallel tests never
// observe each other's variables.
#[test]
fn test_config_environment_overrides() {
    unsafe {
        std::env::set_var("LOCALPOD_LISTEN", "127.0.0.1:3100");
        std::env::set_var("LOCALPOD_STATE", "/tmp/localpod-state.yaml");
        std::env::set_var("LOCALPOD_TLS", "off");
    }
    let mut cfg = Config::default();
    cfg.apply_env().unwrap();
    assert_eq!(cfg.control.listen_addr, "127.0.0.1:3100");
    assert_eq!(cfg.state_path, PathBuf::from("/tmp/localpod-state.yaml"));
    assert!(!cfg.tls.enabled);

    unsafe {
        std::env::set_var("LOCALPOD_TLS", "maybe");
    }
    assert!(Config::default().apply_env().is_err());

    unsafe {
        std::env::remove_var("LOCALPOD_LISTEN");
        std::env::remove_var("LOCALPOD_STATE");
        std::env::remove_var("LOCALPOD_TLS");
    }
    let mut cfg = Config::default();
    cfg.apply_env().unwrap();
    assert_eq!(cfg, Config::default());
}
