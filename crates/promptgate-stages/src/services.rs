//! Collaborators shared by every stage
//!
//! Missing required collaborators fail at wiring time, never at decision
//! time.

use crate::config::ServerConfig;
use promptgate_core::PromptGateError;
use promptgate_injection::InjectionDecisionService;
use promptgate_policy::{
    FileSessionStore, FrameworkDecisionAuthority, GateEnforcementAuthority, GateRegistry, InMemorySessionStore,
    SessionStore,
};
use std::sync::Arc;

pub struct PipelineServices {
    pub config: Arc<ServerConfig>,
    pub injection: Arc<InjectionDecisionService>,
    pub frameworks: Arc<FrameworkDecisionAuthority>,
    pub gates: Arc<GateEnforcementAuthority>,
    pub registry: Arc<GateRegistry>,
    pub sessions: Arc<dyn SessionStore>,
    fingerprint: String,
}

impl PipelineServices {
    pub fn builder() -> PipelineServicesBuilder {
        PipelineServicesBuilder::default()
    }

    /// Wire everything from a configuration snapshot, picking the session
    /// store from `session_dir`
    pub fn from_config(config: ServerConfig) -> Result<Self, PromptGateError> {
        let sessions: Arc<dyn SessionStore> = match &config.session_dir {
            Some(dir) => Arc::new(FileSessionStore::new(dir.clone())),
            None => Arc::new(InMemorySessionStore::new()),
        };
        Self::builder().config(config).session_store(sessions).build()
    }

    /// Fingerprint of the configuration snapshot in use
    pub fn config_fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl std::fmt::Debug for PipelineServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineServices")
            .field("fingerprint", &self.fingerprint)
            .field("prompts", &self.config.prompts.len())
            .finish()
    }
}

#[derive(Default)]
pub struct PipelineServicesBuilder {
    config: Option<ServerConfig>,
    sessions: Option<Arc<dyn SessionStore>>,
    registry: Option<Arc<GateRegistry>>,
}

impl PipelineServicesBuilder {
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    /// Use an existing registry instead of one built from the configured gates
    pub fn registry(mut self, registry: Arc<GateRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<PipelineServices, PromptGateError> {
        let config = self
            .config
            .ok_or_else(|| PromptGateError::WiringError("configuration snapshot is required".to_string()))?;
        let sessions = self
            .sessions
            .ok_or_else(|| PromptGateError::WiringError("session store is required".to_string()))?;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(GateRegistry::from_definitions(config.gates.definitions.clone())));

        let fingerprint = config.fingerprint();
        Ok(PipelineServices {
            injection: Arc::new(InjectionDecisionService::new(config.injection.clone())),
            frameworks: Arc::new(FrameworkDecisionAuthority::new()),
            gates: Arc::new(GateEnforcementAuthority::new()),
            registry,
            sessions,
            config: Arc::new(config),
            fingerprint,
        })
    }
}
