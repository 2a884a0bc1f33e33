use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::protocol::{timeouts, DEFAULT_PORT, DEFAULT_REMOTE_BINARY, DEFAULT_SSH_PROGRAM};

/// Connection and transfer settings for one [`crate::client::Client`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub ssh_program: String,
    pub ssh_options: Vec<String>, // passed as -o <value>
    /// Path of the scp binary on the remote host.
    pub remote_binary: String,
    pub connect_timeout_secs: u64,
    pub batch_mode: bool,     // never prompt for passwords
    pub control_master: bool, // share one ssh connection across transfers
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            user: None,
            identity_file: None,
            ssh_program: DEFAULT_SSH_PROGRAM.to_string(),
            ssh_options: Vec::new(),
            remote_binary: DEFAULT_REMOTE_BINARY.to_string(),
            connect_timeout_secs: timeouts::CONNECT_SECS,
            batch_mode: false,
            control_master: false,
        }
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") { return PathBuf::from(appdata).join("rscp"); }
    }
    // Unix-like default
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("rscp");
    }
    PathBuf::from(".rscp")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("rscp.toml")
}

impl ClientConfig {
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(data: &str) -> Result<Self> {
        let cfg: ClientConfig = toml::from_str(data).context("parse client config")?;
        Ok(cfg)
    }

    /// Load from an explicit path (must exist) or from the default location
    /// (defaults when absent).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(p) => {
                let data = std::fs::read_to_string(p)
                    .with_context(|| format!("read config {}", p.display()))?;
                Self::from_toml_str(&data)
            }
            None => {
                let p = default_config_path();
                if let Ok(data) = std::fs::read_to_string(&p) {
                    Self::from_toml_str(&data)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
