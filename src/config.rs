//! Process configuration.
//!
//! Sources, lowest precedence first: built-in defaults, the YAML file named
//! by `LOCALPOD_CONFIG`, then these environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LOCALPOD_LISTEN` | `127.0.0.1:2700` | control-plane socket address |
//! | `LOCALPOD_STATE` | `storage.yaml` | persisted pod state |
//! | `LOCALPOD_TLS` | `true` | serve pods over HTTPS with a shared certificate |

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub control: ControlConfig,
    pub state_path: PathBuf,
    pub tls: TlsConfig,
    /// Interface every pod listener binds to.
    pub pod_bind_ip: IpAddr,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub listen_addr: String,
    /// Host header the control plane accepts; `localhost:<port>` when unset.
    pub allowed_host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    /// Subject alternative names of a generated certificate.
    pub hosts: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            state_path: PathBuf::from("storage.yaml"),
            tls: TlsConfig::default(),
            pod_bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:2700".to_string(),
            allowed_host: None,
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hosts: vec!["localhost".to_string()],
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var_os("LOCALPOD_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(addr) = std::env::var("LOCALPOD_LISTEN") {
            self.control.listen_addr = addr;
        }
        if let Some(path) = std::env::var_os("LOCALPOD_STATE") {
            self.state_path = PathBuf::from(path);
        }
        if let Ok(flag) = std::env::var("LOCALPOD_TLS") {
            self.tls.enabled = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => anyhow::bail!("LOCALPOD_TLS must be a boolean, got {other:?}"),
            };
        }
        Ok(())
    }

    /// Host header value the control plane accepts.
    pub fn control_host(&self) -> String {
        if let Some(host) = &self.control.allowed_host {
            return host.clone();
        }
        let port = self
            .control
            .listen_addr
            .rsplit(':')
            .next()
            .unwrap_or_default();
        format!("localhost:{port}")
    }
}
