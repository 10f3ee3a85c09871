//! Shared state for web handlers

use std::sync::Arc;
use std::time::Duration;

use crate::accounts::AccountService;
use crate::api::CerbosClient;
use crate::authz::{resolver_from_config, Authorizer, CerbosAuthorizer};
use crate::config::Config;
use crate::events::Broadcaster;
use crate::process::CompletionService;
use crate::store::Store;
use crate::workflow::WorkflowRegistry;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<WorkflowRegistry>,
    pub store: Arc<dyn Store>,
    pub accounts: Arc<AccountService>,
    pub completion: Arc<CompletionService>,
    pub broadcaster: Broadcaster,
}

impl AppState {
    pub fn new<S: Store + 'static>(
        config: Config,
        registry: Arc<WorkflowRegistry>,
        store: Arc<S>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let broadcaster = Broadcaster::default();
        let accounts = AccountService::new(store.clone(), &config);
        let completion = CompletionService::new(
            registry.clone(),
            store.clone(),
            authorizer,
            broadcaster.clone(),
            config.attachments.max_bytes,
        );
        Self {
            config: Arc::new(config),
            registry,
            store,
            accounts: Arc::new(accounts),
            completion: Arc::new(completion),
            broadcaster,
        }
    }

    /// State wired to the Cerbos deployment and identity service in `config`
    pub fn from_config<S: Store + 'static>(
        config: Config,
        registry: Arc<WorkflowRegistry>,
        store: Arc<S>,
    ) -> anyhow::Result<Self> {
        let teams = resolver_from_config(&config.identity)?;
        let client = CerbosClient::new(
            &config.policy.base_url,
            Duration::from_secs(config.policy.timeout_secs),
        )?;
        let authorizer = CerbosAuthorizer::new(client, teams, config.identity.lookup_mode);
        Ok(Self::new(config, registry, store, Arc::new(authorizer)))
    }

    pub fn default_workflow(&self) -> &str {
        &self.config.workflows.default_key
    }
}
