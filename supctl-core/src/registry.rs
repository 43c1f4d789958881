use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::policy::RestartPolicy;
use crate::proc::ProcId;
use crate::BackoffConfig;

/// One declared process. Immutable once loaded; a changed declaration is
/// applied through `Supervisor::reload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_cwd")]
    pub cwd: PathBuf,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub max_restarts: Option<u32>,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default = "default_stop_timeout", with = "duration_secs")]
    pub stop_timeout: Duration,
}

fn default_true() -> bool {
    true
}

fn default_cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            cwd: default_cwd(),
            env: HashMap::new(),
            enabled: true,
            restart_policy: RestartPolicy::default(),
            max_restarts: None,
            backoff: BackoffConfig::default(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

/// Validated, ordered set of process declarations. Loading is side-effect
/// free; nothing is spawned here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    specs: Vec<ProcessSpec>,
}

impl Registry {
    pub fn from_specs(specs: Vec<ProcessSpec>) -> crate::Result<Self> {
        let mut seen = HashSet::new();
        // Names become ProcIds downstream; two declarations that sanitize to
        // the same id would silently shadow each other, so both id
        // convertibility and id uniqueness are load-time errors.
        let mut ids: HashMap<ProcId, String> = HashMap::new();
        for spec in &specs {
            if spec.name.trim().is_empty() {
                return Err(crate::Error::Validation(
                    "process entry with an empty name".to_string(),
                ));
            }
            if spec.command.trim().is_empty() {
                return Err(crate::Error::Validation(format!(
                    "process {} has an empty command",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.clone()) {
                return Err(crate::Error::Validation(format!(
                    "duplicate process name: {}",
                    spec.name
                )));
            }
            let id = ProcId::new(&spec.name).map_err(|_| {
                crate::Error::Validation(format!(
                    "process name {:?} has no usable characters",
                    spec.name
                ))
            })?;
            if let Some(other) = ids.insert(id, spec.name.clone()) {
                return Err(crate::Error::Validation(format!(
                    "process names {other:?} and {:?} collide after sanitization",
                    spec.name
                )));
            }
        }
        Ok(Self { specs })
    }

    /// Load and validate a registry file. See `config::loader` for the
    /// formats understood.
    pub async fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        crate::config::ConfigLoader::new().load_file(path.as_ref()).await
    }

    /// Entries in declaration order, disabled ones included.
    pub fn list(&self) -> &[ProcessSpec] {
        &self.specs
    }

    pub fn find(&self, name: &str) -> crate::Result<&ProcessSpec> {
        self.specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| crate::Error::NotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_names() {
        let specs = vec![
            ProcessSpec::new("server", "./server"),
            ProcessSpec::new("server", "./other"),
        ];
        let err = Registry::from_specs(specs).unwrap_err();
        assert!(matches!(err, crate::Error::Validation(_)));
    }

    #[test]
    fn rejects_names_that_collide_after_sanitization() {
        // Both sanitize to "a-b"; accepting them would shadow one process.
        let specs = vec![
            ProcessSpec::new("a b", "./first"),
            ProcessSpec::new("a-b", "./second"),
        ];
        let err = Registry::from_specs(specs).unwrap_err();
        assert!(matches!(err, crate::Error::Validation(_)));
    }

    #[test]
    fn rejects_names_with_no_usable_characters() {
        let specs = vec![ProcessSpec::new("!!!", "./worker")];
        let err = Registry::from_specs(specs).unwrap_err();
        assert!(matches!(err, crate::Error::Validation(_)));
    }

    #[test]
    fn preserves_declaration_order() {
        let specs = vec![
            ProcessSpec::new("server", "./server"),
            ProcessSpec::new("pallet-stream", "./pallet-stream"),
            ProcessSpec::new("cw721-stream", "./cw721-stream"),
        ];
        let registry = Registry::from_specs(specs).unwrap();
        let names: Vec<_> = registry.list().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["server", "pallet-stream", "cw721-stream"]);
    }
}
