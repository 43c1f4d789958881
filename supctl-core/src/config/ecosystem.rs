use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::policy::RestartPolicy;
use crate::registry::ProcessSpec;
use crate::BackoffConfig;

/// PM2 ecosystem-style declaration format:
///
/// ```json
/// { "apps": [ { "name": "server", "script": "./target/release/server" } ] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcosystemConfig {
    pub apps: Vec<EcosystemApp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcosystemApp {
    pub name: String,
    pub script: String,

    /// Disabled entries are kept in the registry but never started; this is
    /// how an operator parks an app without deleting its declaration.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,

    /// PM2 compatibility: `autorestart: false` means policy `never`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autorestart: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,

    /// Base restart delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_delay: Option<u64>,

    /// Seconds allowed for a polite exit before SIGKILL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_timeout: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl EcosystemApp {
    pub fn to_spec(&self) -> ProcessSpec {
        // Whitespace split only; the script field is never handed to a shell.
        let args = self
            .args
            .as_ref()
            .map(|a| a.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let cwd = self
            .cwd
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")));

        let restart_policy = self.restart_policy.unwrap_or(match self.autorestart {
            Some(false) => RestartPolicy::Never,
            _ => RestartPolicy::OnFailure,
        });

        let mut backoff = BackoffConfig::default();
        if let Some(delay) = self.restart_delay {
            backoff.base_delay_ms = delay;
        }

        ProcessSpec {
            name: self.name.clone(),
            command: self.script.clone(),
            args,
            cwd,
            env: self.env.clone().unwrap_or_default(),
            enabled: self.enabled,
            restart_policy,
            max_restarts: self.max_restarts,
            backoff,
            stop_timeout: Duration::from_secs(self.stop_timeout.unwrap_or(10)),
        }
    }
}

impl EcosystemConfig {
    pub fn parse(content: &str) -> crate::Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| crate::Error::Config(format!("failed to parse ecosystem config: {e}")))
    }
}
