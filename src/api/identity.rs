//! Identity service client: team memberships and idempotent upserts

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use super::error::UpstreamError;
use crate::config::IdentityConfig;

const PROVIDER_NAME: &str = "identity";

/// Result of a create call against the identity service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Deserialize)]
struct MembershipPage {
    #[serde(default)]
    items: Vec<MembershipItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembershipItem {
    team_id: String,
}

#[derive(Debug, Serialize)]
struct CreateTeam<'a> {
    id: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUser<'a> {
    id: &'a str,
    email: &'a str,
    display_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateMembership<'a> {
    user_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    project_id: String,
    membership_limit: u32,
}

impl IdentityClient {
    pub fn new(config: &IdentityConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("attesta/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UpstreamError::network(PROVIDER_NAME, e.to_string()))?;
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            UpstreamError::network(PROVIDER_NAME, format!("Invalid base URL '{}': {}", config.base_url, e))
        })?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            project_id: config.project_id.clone(),
            membership_limit: config.membership_limit,
        })
    }

    /// Base URL with each segment appended percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                UpstreamError::network(PROVIDER_NAME, format!("Base URL '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .header("X-Project-Id", &self.project_id)
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("X-Api-Key", &self.api_key)
            .header("X-Project-Id", &self.project_id)
    }

    /// Team IDs the user belongs to, deduplicated and sorted
    ///
    /// One call with the configured limit; further pages are not followed.
    pub async fn list_team_ids(&self, user_id: &str) -> Result<Vec<String>, UpstreamError> {
        let mut url = self.endpoint(&["v1", "users", user_id, "memberships"])?;
        url.query_pairs_mut()
            .append_pair("limit", &self.membership_limit.to_string());

        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| UpstreamError::network(PROVIDER_NAME, e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::http(PROVIDER_NAME, status, body));
        }

        let page: MembershipPage = response
            .json()
            .await
            .map_err(|e| UpstreamError::malformed(PROVIDER_NAME, e.to_string()))?;

        let ids: BTreeSet<String> = page.items.into_iter().map(|m| m.team_id).collect();
        Ok(ids.into_iter().collect())
    }

    pub async fn create_team(&self, id: &str, name: &str) -> Result<CreateOutcome, UpstreamError> {
        let url = self.endpoint(&["v1", "teams"])?;
        self.create(url, &CreateTeam { id, name }).await
    }

    pub async fn create_user(
        &self,
        id: &str,
        email: &str,
        display_name: &str,
    ) -> Result<CreateOutcome, UpstreamError> {
        let url = self.endpoint(&["v1", "users"])?;
        self.create(
            url,
            &CreateUser {
                id,
                email,
                display_name,
            },
        )
        .await
    }

    pub async fn create_membership(
        &self,
        team_id: &str,
        user_id: &str,
    ) -> Result<CreateOutcome, UpstreamError> {
        let url = self.endpoint(&["v1", "teams", team_id, "memberships"])?;
        self.create(url, &CreateMembership { user_id }).await
    }

    /// 200/201 created, 409 already exists, anything else an error
    async fn create<T: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<CreateOutcome, UpstreamError> {
        let response = self
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::network(PROVIDER_NAME, e.to_string()))?;

        match response.status().as_u16() {
            200 | 201 => Ok(CreateOutcome::Created),
            409 => {
                debug!(url = %url, "Already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(UpstreamError::http(PROVIDER_NAME, status, body))
            }
        }
    }
}
