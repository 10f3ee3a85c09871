//! Completion authorization against the policy decision point.

pub mod sync;
pub mod teams;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::cerbos::{
    CerbosClient, CheckRequest, Principal, PrincipalAttr, Resource, ResourceAttr, ResourceEntry,
};
use crate::api::UpstreamError;
use crate::config::TeamLookupMode;
use crate::process::Actor;
use crate::workflow::Substep;

pub use sync::{run_sync, sync_teams, IdentityDirectory, IdentityError, SyncPlan, SyncReport};
pub use teams::{resolver_from_config, IdentityTeamResolver, NoopTeamResolver, TeamResolver};

pub const COMPLETE_ACTION: &str = "complete";
pub const SUBSTEP_KIND: &str = "substep";

/// Everything the policy needs to decide one completion
#[derive(Debug, Clone, Copy)]
pub struct CompletionCheck<'a> {
    pub actor: &'a Actor,
    pub process_id: &'a str,
    pub workflow_key: &'a str,
    pub substep: &'a Substep,
    pub step_order: u32,
    pub sequence_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    #[error("policy engine error: {0}")]
    Engine(UpstreamError),
    #[error("team lookup failed: {0}")]
    TeamLookup(UpstreamError),
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// `Ok(false)` is a deny; `Err` means no decision could be made
    async fn can_complete(&self, check: &CompletionCheck<'_>) -> Result<bool, AuthzError>;
}

/// Authorizer backed by a Cerbos deployment
pub struct CerbosAuthorizer {
    client: CerbosClient,
    teams: Arc<dyn TeamResolver>,
    lookup_mode: TeamLookupMode,
}

impl CerbosAuthorizer {
    pub fn new(client: CerbosClient, teams: Arc<dyn TeamResolver>, lookup_mode: TeamLookupMode) -> Self {
        Self {
            client,
            teams,
            lookup_mode,
        }
    }

    async fn resolve_teams(&self, user_id: &str) -> Result<Vec<String>, AuthzError> {
        if !self.teams.team_checks_enabled() {
            return Ok(Vec::new());
        }
        match self.teams.team_ids_for_user(user_id).await {
            Ok(ids) => Ok(ids),
            Err(e) => match self.lookup_mode {
                TeamLookupMode::FailOpen => {
                    warn!(user_id = %user_id, error = %e, "Team lookup failed, continuing without teams");
                    Ok(Vec::new())
                }
                TeamLookupMode::Strict => Err(AuthzError::TeamLookup(e)),
            },
        }
    }
}

#[async_trait]
impl Authorizer for CerbosAuthorizer {
    async fn can_complete(&self, check: &CompletionCheck<'_>) -> Result<bool, AuthzError> {
        let team_ids = self.resolve_teams(&check.actor.user_id).await?;
        let request = build_check_request(check, team_ids, self.teams.team_checks_enabled());
        let response = self.client.check(&request).await.map_err(AuthzError::Engine)?;

        let allowed = response.is_allowed(&check.substep.id, COMPLETE_ACTION);
        debug!(
            process_id = %check.process_id,
            substep_id = %check.substep.id,
            user_id = %check.actor.user_id,
            allowed,
            "Policy decision"
        );
        Ok(allowed)
    }
}

/// Decision request for one substep completion
pub fn build_check_request(
    check: &CompletionCheck<'_>,
    team_ids: Vec<String>,
    team_checks_enabled: bool,
) -> CheckRequest {
    CheckRequest {
        request_id: Uuid::new_v4().to_string(),
        principal: Principal {
            id: check.actor.user_id.clone(),
            roles: vec![check.actor.role.clone()],
            attr: PrincipalAttr {
                role: check.actor.role.clone(),
                workflow_key: check.actor.workflow_key.clone(),
                team_ids,
                team_checks_enabled,
            },
        },
        resources: vec![ResourceEntry {
            actions: vec![COMPLETE_ACTION.to_string()],
            resource: Resource {
                kind: SUBSTEP_KIND.to_string(),
                id: check.substep.id.clone(),
                attr: ResourceAttr {
                    required_role: check.substep.role.clone(),
                    step_order: check.step_order,
                    substep_order: check.substep.order,
                    process_id: check.process_id.to_string(),
                    substep_id: check.substep.id.clone(),
                    workflow_key: check.workflow_key.to_string(),
                    sequence_ok: check.sequence_ok,
                    required_team_ids: check.substep.team_ids.clone(),
                },
            },
        }],
    }
}
