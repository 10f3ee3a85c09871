//! Cerbos policy decision point client (`POST /api/check`)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::error::UpstreamError;

const PROVIDER_NAME: &str = "cerbos";

/// Effect string Cerbos returns for a permitted action
pub const EFFECT_ALLOW: &str = "EFFECT_ALLOW";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub request_id: String,
    pub principal: Principal,
    pub resources: Vec<ResourceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    pub id: String,
    pub roles: Vec<String>,
    pub attr: PrincipalAttr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalAttr {
    pub role: String,
    pub workflow_key: String,
    pub team_ids: Vec<String>,
    pub team_checks_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceEntry {
    pub actions: Vec<String>,
    pub resource: Resource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub kind: String,
    pub id: String,
    pub attr: ResourceAttr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAttr {
    pub required_role: String,
    pub step_order: u32,
    pub substep_order: u32,
    pub process_id: String,
    pub substep_id: String,
    pub workflow_key: String,
    pub sequence_ok: bool,
    pub required_team_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckResponse {
    #[serde(default)]
    pub results: Vec<CheckResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckResult {
    pub resource: ResultResource,
    #[serde(default)]
    pub actions: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultResource {
    pub id: String,
}

impl CheckResponse {
    /// Explicit ALLOW for `action` on resource `id`; anything else is a deny
    pub fn is_allowed(&self, resource_id: &str, action: &str) -> bool {
        self.results
            .iter()
            .find(|r| r.resource.id == resource_id)
            .and_then(|r| r.actions.get(action))
            .is_some_and(|effect| effect == EFFECT_ALLOW)
    }
}

/// HTTP client for one Cerbos deployment
#[derive(Debug, Clone)]
pub struct CerbosClient {
    client: reqwest::Client,
    base_url: String,
}

impl CerbosClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("attesta/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one check request; non-200 or undecodable bodies are errors
    pub async fn check(&self, request: &CheckRequest) -> Result<CheckResponse, UpstreamError> {
        let url = format!("{}/api/check", self.base_url);
        debug!(request_id = %request.request_id, "Sending policy check");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| UpstreamError::network(PROVIDER_NAME, e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::http(PROVIDER_NAME, status, body));
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::malformed(PROVIDER_NAME, e.to_string()))
    }
}
