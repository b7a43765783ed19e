//! Session configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port the on-device agent listens on
pub const DEFAULT_AGENT_PORT: u16 = 29100;

/// Bundle of the test package hosting the agent
pub const DEFAULT_AGENT_BUNDLE: &str = "com.harmony.uitest";

/// Test runner class used to launch the agent
pub const DEFAULT_RUNNER: &str = "/ets/testrunner/OpenHarmonyTestRunner";

/// Configuration for one device session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Device serial as reported by `hdc list targets`
    pub serial: String,
    /// Bridge executable
    pub hdc: PathBuf,
    /// Local end of the port forward; allocated once per session when unset
    pub local_port: Option<u16>,
    pub agent_port: u16,
    pub agent_bundle: String,
    pub runner: String,
    pub connect_timeout_s: u64,
    /// Base wait for any response, before per-command hints are added
    pub discovery_timeout_s: u64,
    /// Directory holding helper packages installed when a driver starts
    pub hap_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            serial: String::new(),
            hdc: PathBuf::from("hdc"),
            local_port: None,
            agent_port: DEFAULT_AGENT_PORT,
            agent_bundle: DEFAULT_AGENT_BUNDLE.to_string(),
            runner: DEFAULT_RUNNER.to_string(),
            connect_timeout_s: 30,
            discovery_timeout_s: 20,
            hap_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            ..Self::default()
        }
    }

    /// Load a config from a JSON file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_s)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_s)
    }

    /// Process key the agent runs under, derived from its port
    pub fn agent_key(&self) -> String {
        format!("ActsAbilityTest#uiTestProcess{}", self.agent_port)
    }
}
