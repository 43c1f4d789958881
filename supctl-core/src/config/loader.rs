use std::path::{Path, PathBuf};

use super::EcosystemConfig;
use crate::registry::{ProcessSpec, Registry};

/// Registry loader with auto-discovery. Config files are data, never code:
/// a `.js` ecosystem file is rejected with a conversion hint instead of
/// being executed.
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            search_paths: vec![PathBuf::from(".")],
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Discover and load a registry. Candidates per directory, in order:
    /// `ecosystem.config.json`, `ecosystem.config`, `supctl.json`.
    pub async fn load(&self) -> crate::Result<Registry> {
        for dir in &self.search_paths {
            for candidate in ["ecosystem.config.json", "ecosystem.config", "supctl.json"] {
                let path = dir.join(candidate);
                if path.exists() {
                    return self.load_file(&path).await;
                }
            }
            let js = dir.join("ecosystem.config.js");
            if js.exists() {
                return Err(Self::js_rejection(&js));
            }
        }
        Err(crate::Error::Config(
            "no registry file found (looked for ecosystem.config.json, ecosystem.config, supctl.json)"
                .to_string(),
        ))
    }

    /// Load a specific registry file. Both the ecosystem format and a bare
    /// `{ "apps": [ProcessSpec, ...] }` document are accepted.
    pub async fn load_file(&self, path: &Path) -> crate::Result<Registry> {
        if path.extension().and_then(|s| s.to_str()) == Some("js") {
            return Err(Self::js_rejection(path));
        }
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            crate::Error::Config(format!("cannot read registry {}: {e}", path.display()))
        })?;

        if let Ok(config) = EcosystemConfig::parse(&content) {
            let specs = config.apps.iter().map(|app| app.to_spec()).collect();
            return Registry::from_specs(specs);
        }

        let specs: Vec<ProcessSpec> = serde_json::from_str::<SpecFile>(&content)
            .map(|f| f.apps)
            .map_err(|e| {
                crate::Error::Config(format!("failed to parse {}: {e}", path.display()))
            })?;
        Registry::from_specs(specs)
    }

    fn js_rejection(path: &Path) -> crate::Error {
        crate::Error::Config(format!(
            "JavaScript config files are not executed; convert {} to JSON \
             (module.exports = {{ apps: [...] }} becomes {{ \"apps\": [...] }})",
            path.display()
        ))
    }
}

#[derive(serde::Deserialize)]
struct SpecFile {
    apps: Vec<ProcessSpec>,
}
