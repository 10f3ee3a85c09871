//! External team membership lookup used to enrich policy checks

use async_trait::async_trait;
use std::sync::Arc;

use crate::api::{IdentityClient, UpstreamError};
use crate::config::IdentityConfig;

#[async_trait]
pub trait TeamResolver: Send + Sync {
    /// Team IDs for a user, deduplicated and sorted
    async fn team_ids_for_user(&self, user_id: &str) -> Result<Vec<String>, UpstreamError>;

    /// Whether policy checks should consider team IDs at all
    fn team_checks_enabled(&self) -> bool;
}

/// Resolver used when no identity service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTeamResolver;

#[async_trait]
impl TeamResolver for NoopTeamResolver {
    async fn team_ids_for_user(&self, _user_id: &str) -> Result<Vec<String>, UpstreamError> {
        Ok(Vec::new())
    }

    fn team_checks_enabled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct IdentityTeamResolver {
    client: IdentityClient,
}

impl IdentityTeamResolver {
    pub fn new(client: IdentityClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TeamResolver for IdentityTeamResolver {
    async fn team_ids_for_user(&self, user_id: &str) -> Result<Vec<String>, UpstreamError> {
        self.client.list_team_ids(user_id).await
    }

    fn team_checks_enabled(&self) -> bool {
        true
    }
}

/// Live resolver when the identity service is configured, no-op otherwise
pub fn resolver_from_config(
    config: &IdentityConfig,
) -> Result<Arc<dyn TeamResolver>, UpstreamError> {
    if config.is_enabled() {
        Ok(Arc::new(IdentityTeamResolver::new(IdentityClient::new(config)?)))
    } else {
        Ok(Arc::new(NoopTeamResolver))
    }
}
