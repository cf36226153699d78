//! Server configuration snapshot
//!
//! Loaded once from YAML and shared as `Arc<ServerConfig>`; never mutated
//! while a request is running.

use promptgate_core::{fingerprint, PromptGateError};
use promptgate_injection::InjectionConfigSet;
use promptgate_policy::{FrameworkSnapshot, GateSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Catalog entry for one prompt or chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Prompt body sent to the client (no template rendering)
    #[serde(default)]
    pub text: String,
    /// Gates for single-prompt execution
    #[serde(default)]
    pub gates: Vec<String>,
    /// Gates per 1-based step when used as a chain
    #[serde(default)]
    pub step_gates: BTreeMap<u32, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub injection: InjectionConfigSet,
    #[serde(default)]
    pub frameworks: FrameworkSnapshot,
    /// Framework id → system-prompt text
    #[serde(default)]
    pub framework_prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub gates: GateSettings,
    #[serde(default)]
    pub prompts: BTreeMap<String, PromptEntry>,
    /// Style id → style-guidance text
    #[serde(default)]
    pub styles: BTreeMap<String, String>,
    /// Directory for file-backed sessions; in-memory when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, PromptGateError> {
        serde_yaml::from_str(yaml).map_err(|e| PromptGateError::ConfigError(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PromptGateError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| PromptGateError::ConfigError(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_yaml(&yaml)?;
        tracing::info!(
            path = %path.display(),
            prompts = config.prompts.len(),
            gates = config.gates.definitions.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Fingerprint of the snapshot, stable across loads of the same content
    pub fn fingerprint(&self) -> String {
        fingerprint(&serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn prompt(&self, id: &str) -> Option<&PromptEntry> {
        self.prompts.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptgate_core::{EnforcementMode, InjectionType};

    const EXAMPLE: &str = include_str!("../../../config/promptgate.example.yaml");

    #[test]
    fn test_example_config_parses() {
        let config = ServerConfig::from_yaml(EXAMPLE).unwrap();
        assert!(config.frameworks.enabled);
        assert_eq!(config.frameworks.active.as_deref(), Some("cageerf"));
        assert_eq!(config.gates.enforcement_mode, EnforcementMode::Strict);
        assert!(config.prompts.contains_key("code-review"));
        assert!(config.injection.global.contains_key(&InjectionType::SystemPrompt));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = ServerConfig::from_yaml(EXAMPLE).unwrap();
        let b = ServerConfig::from_yaml(EXAMPLE).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.fingerprint().starts_with("blake3:"));

        let mut c = b.clone();
        c.styles.insert("terse".to_string(), "Be terse.".to_string());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_bad_yaml_is_config_error() {
        let err = ServerConfig::from_yaml("prompts: [").unwrap_err();
        assert!(err.to_string().starts_with("CONFIG/"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ServerConfig::load("/nonexistent/promptgate.yaml").unwrap_err();
        assert!(matches!(err, PromptGateError::ConfigError(_)));
    }
}
