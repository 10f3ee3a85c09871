//! Reconcile departments, users and substep team requirements with the
//! identity service.
//!
//! Every create call treats "already exists" as success, so running a sync
//! twice in a row creates nothing the second time.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::api::{CreateOutcome, IdentityClient, UpstreamError};
use crate::config::{DepartmentConfig, IdentityConfig};
use crate::store::{StoreError, User, UserStore};
use crate::workflow::WorkflowRegistry;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity service is not configured")]
    Disabled,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create side of the identity service
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn create_team(&self, id: &str, name: &str) -> Result<CreateOutcome, UpstreamError>;

    async fn create_user(
        &self,
        id: &str,
        email: &str,
        display_name: &str,
    ) -> Result<CreateOutcome, UpstreamError>;

    async fn create_membership(
        &self,
        team_id: &str,
        user_id: &str,
    ) -> Result<CreateOutcome, UpstreamError>;
}

#[async_trait]
impl IdentityDirectory for IdentityClient {
    async fn create_team(&self, id: &str, name: &str) -> Result<CreateOutcome, UpstreamError> {
        IdentityClient::create_team(self, id, name).await
    }

    async fn create_user(
        &self,
        id: &str,
        email: &str,
        display_name: &str,
    ) -> Result<CreateOutcome, UpstreamError> {
        IdentityClient::create_user(self, id, email, display_name).await
    }

    async fn create_membership(
        &self,
        team_id: &str,
        user_id: &str,
    ) -> Result<CreateOutcome, UpstreamError> {
        IdentityClient::create_membership(self, team_id, user_id).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTeam {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUser {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMembership {
    pub team_id: String,
    pub user_id: String,
}

/// Everything that should exist in the identity service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub teams: Vec<PlannedTeam>,
    pub users: Vec<PlannedUser>,
    pub memberships: Vec<PlannedMembership>,
}

impl SyncPlan {
    /// Teams are departments plus substep team requirements; each active
    /// user joins the team named after their role slug, if planned
    pub fn build(
        departments: &[DepartmentConfig],
        registry: &WorkflowRegistry,
        users: &[User],
    ) -> Self {
        let mut teams: BTreeMap<String, String> = BTreeMap::new();
        for dept in departments {
            teams.insert(dept.id.clone(), dept.name.clone());
        }
        for def in registry.iter() {
            for seq in def.sequence() {
                for team_id in &seq.substep.team_ids {
                    teams
                        .entry(team_id.clone())
                        .or_insert_with(|| team_id.clone());
                }
            }
        }

        let mut active: Vec<&User> = users.iter().filter(|u| u.is_active()).collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));

        let memberships = active
            .iter()
            .filter_map(|u| {
                let role = u.role_slug.as_ref()?;
                teams.contains_key(role).then(|| PlannedMembership {
                    team_id: role.clone(),
                    user_id: u.id.clone(),
                })
            })
            .collect();

        Self {
            teams: teams
                .into_iter()
                .map(|(id, name)| PlannedTeam { id, name })
                .collect(),
            users: active
                .iter()
                .map(|u| PlannedUser {
                    id: u.id.clone(),
                    email: u.email.clone(),
                    display_name: u.display_name.clone(),
                })
                .collect(),
            memberships,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub teams_created: usize,
    pub teams_existing: usize,
    pub users_created: usize,
    pub users_existing: usize,
    pub memberships_created: usize,
    pub memberships_existing: usize,
}

impl SyncReport {
    pub fn total_created(&self) -> usize {
        self.teams_created + self.users_created + self.memberships_created
    }
}

fn tally(outcome: CreateOutcome, created: &mut usize, existing: &mut usize) {
    match outcome {
        CreateOutcome::Created => *created += 1,
        CreateOutcome::AlreadyExists => *existing += 1,
    }
}

/// Apply a plan; the first upstream failure aborts the run
pub async fn run_sync(
    directory: &dyn IdentityDirectory,
    plan: &SyncPlan,
) -> Result<SyncReport, UpstreamError> {
    let mut report = SyncReport::default();

    for team in &plan.teams {
        let outcome = directory.create_team(&team.id, &team.name).await?;
        tally(outcome, &mut report.teams_created, &mut report.teams_existing);
    }
    for user in &plan.users {
        let outcome = directory
            .create_user(&user.id, &user.email, &user.display_name)
            .await?;
        tally(outcome, &mut report.users_created, &mut report.users_existing);
    }
    for membership in &plan.memberships {
        let outcome = directory
            .create_membership(&membership.team_id, &membership.user_id)
            .await?;
        tally(
            outcome,
            &mut report.memberships_created,
            &mut report.memberships_existing,
        );
    }

    info!(
        teams_created = report.teams_created,
        users_created = report.users_created,
        memberships_created = report.memberships_created,
        "Identity sync finished"
    );
    Ok(report)
}

/// Build the plan from configuration and store contents, then apply it
pub async fn sync_teams<U: UserStore + ?Sized>(
    config: &IdentityConfig,
    registry: &WorkflowRegistry,
    users: &U,
) -> Result<SyncReport, IdentityError> {
    if !config.is_enabled() {
        warn!("Identity sync requested but identity.base_url is empty");
        return Err(IdentityError::Disabled);
    }
    let client = IdentityClient::new(config)?;
    let all_users = users.list_users(None).await?;
    let plan = SyncPlan::build(&config.departments, registry, &all_users);
    Ok(run_sync(&client, &plan).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UserStatus;
    use crate::workflow::loader::parse_workflow;
    use crate::workflow::WorkflowRegistry;
    use std::collections::BTreeSet;
    use std::path::Path;
    use std::sync::Mutex;

    /// Directory that remembers everything created
    #[derive(Default)]
    struct FakeDirectory {
        teams: Mutex<BTreeSet<String>>,
        users: Mutex<BTreeSet<String>>,
        memberships: Mutex<BTreeSet<(String, String)>>,
    }

    fn outcome(inserted: bool) -> CreateOutcome {
        if inserted {
            CreateOutcome::Created
        } else {
            CreateOutcome::AlreadyExists
        }
    }

    #[async_trait]
    impl IdentityDirectory for FakeDirectory {
        async fn create_team(&self, id: &str, _name: &str) -> Result<CreateOutcome, UpstreamError> {
            Ok(outcome(self.teams.lock().unwrap().insert(id.to_string())))
        }

        async fn create_user(
            &self,
            id: &str,
            _email: &str,
            _display_name: &str,
        ) -> Result<CreateOutcome, UpstreamError> {
            Ok(outcome(self.users.lock().unwrap().insert(id.to_string())))
        }

        async fn create_membership(
            &self,
            team_id: &str,
            user_id: &str,
        ) -> Result<CreateOutcome, UpstreamError> {
            let key = (team_id.to_string(), user_id.to_string());
            Ok(outcome(self.memberships.lock().unwrap().insert(key)))
        }
    }

    const TEAMED: &str = r#"
key: teamed
title: Teamed
steps:
  - id: "1"
    title: One
    order: 1
    substeps:
      - id: "1.1"
        title: Sign
        order: 1
        role: legal
        input_key: signature
        input_type: string
        team_ids: [legal, board]
"#;

    fn registry() -> WorkflowRegistry {
        let teamed = parse_workflow(TEAMED, Path::new("teamed.yaml")).unwrap();
        let demo = crate::workflow::loader::load_builtin().unwrap();
        WorkflowRegistry::from_defs(vec![demo, teamed]).unwrap()
    }

    fn user(id: &str, role: &str, active: bool) -> User {
        let mut user = User::new(Some("org".to_string()), &format!("{}@x.io", id), id);
        user.id = id.to_string();
        user.role_slug = Some(role.to_string());
        if active {
            user.status = UserStatus::Active;
        }
        user
    }

    fn departments() -> Vec<DepartmentConfig> {
        vec![
            DepartmentConfig {
                id: "dep1".to_string(),
                name: "Department 1".to_string(),
            },
            DepartmentConfig {
                id: "legal".to_string(),
                name: "Legal".to_string(),
            },
        ]
    }

    #[test]
    fn test_plan_unions_departments_and_substep_teams() {
        let users = vec![user("u1", "dep1", true), user("u2", "dep2", true), user("u3", "legal", false)];
        let plan = SyncPlan::build(&departments(), &registry(), &users);

        let team_ids: Vec<&str> = plan.teams.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(team_ids, vec!["board", "dep1", "legal"]);
        assert_eq!(plan.teams[2].name, "Legal");

        let user_ids: Vec<&str> = plan.users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(user_ids, vec!["u1", "u2"]);

        assert_eq!(
            plan.memberships,
            vec![PlannedMembership {
                team_id: "dep1".to_string(),
                user_id: "u1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_second_run_creates_nothing() {
        let users = vec![user("u1", "dep1", true), user("u2", "legal", true)];
        let plan = SyncPlan::build(&departments(), &registry(), &users);
        let directory = FakeDirectory::default();

        let first = run_sync(&directory, &plan).await.unwrap();
        assert_eq!(first.teams_created, 3);
        assert_eq!(first.users_created, 2);
        assert_eq!(first.memberships_created, 2);

        let second = run_sync(&directory, &plan).await.unwrap();
        assert_eq!(second.total_created(), 0);
        assert_eq!(second.teams_existing, 3);
        assert_eq!(second.memberships_existing, 2);
    }

    #[tokio::test]
    async fn test_sync_teams_requires_configuration() {
        let store = crate::store::InMemoryStore::new();
        let err = sync_teams(&IdentityConfig::default(), &registry(), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Disabled));
    }
}
