use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
    pub attachments: AttachmentsConfig,
    pub policy: PolicyConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    pub workflows: WorkflowsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Absolute base URL used when logging invite and reset links
    pub public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of a login session in hours (default: 12)
    #[serde(default = "default_session_ttl")]
    pub ttl_hours: i64,
    /// Set the Secure attribute on session cookies
    #[serde(default)]
    pub cookie_secure: bool,
}

fn default_session_ttl() -> i64 {
    12
}

/// Who may create a new organization through `/signup`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignupPolicy {
    /// Organizations are created by platform admins only
    #[default]
    Disabled,
    /// Anyone may create an organization and becomes its org admin
    Open,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Accept the `demo_user` cookie when no session is present
    #[serde(default)]
    pub legacy_cookie: bool,
    #[serde(default)]
    pub signup: SignupPolicy,
    /// Lifetime of invite links in hours (default: 72)
    #[serde(default = "default_invite_ttl")]
    pub invite_ttl_hours: i64,
    /// Lifetime of password reset links in minutes (default: 60)
    #[serde(default = "default_reset_ttl")]
    pub reset_ttl_minutes: i64,
    /// Platform admin created at startup when missing
    #[serde(default)]
    pub bootstrap_admin_email: Option<String>,
    #[serde(default)]
    pub bootstrap_admin_password: Option<String>,
}

fn default_invite_ttl() -> i64 {
    72
}

fn default_reset_ttl() -> i64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentsConfig {
    /// Largest accepted upload in bytes (default: 10 MiB)
    #[serde(default = "default_max_upload")]
    pub max_bytes: usize,
}

fn default_max_upload() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Base URL of the Cerbos policy decision point
    pub base_url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_http_timeout() -> u64 {
    10
}

/// What to do when the identity service cannot list a user's teams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamLookupMode {
    /// Continue without team enrichment
    #[default]
    FailOpen,
    /// Abort the authorization with the lookup error
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentConfig {
    pub id: String,
    pub name: String,
}

/// External identity service used for team memberships
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Disabled when empty; team enrichment then uses the no-op resolver
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub lookup_mode: TeamLookupMode,
    /// Page size of the single membership listing call
    #[serde(default = "default_membership_limit")]
    pub membership_limit: u32,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    /// Departments mirrored as external teams by `sync-teams`
    #[serde(default)]
    pub departments: Vec<DepartmentConfig>,
}

fn default_membership_limit() -> u32 {
    100
}

impl IdentityConfig {
    pub fn is_enabled(&self) -> bool {
        !self.base_url.trim().is_empty()
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            project_id: String::new(),
            lookup_mode: TeamLookupMode::default(),
            membership_limit: default_membership_limit(),
            timeout_secs: default_http_timeout(),
            departments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowsConfig {
    /// Directory of `*.yaml` workflow definitions; the built-in demo
    /// workflow is used when unset
    #[serde(default)]
    pub dir: Option<String>,
    pub default_key: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs to a timestamped file in this directory instead of stderr
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl Config {
    /// Path to the project-local config file
    pub fn local_config_path() -> PathBuf {
        PathBuf::from("attesta.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so attesta works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let local_config = Self::local_config_path();
        if local_config.exists() {
            builder = builder.add_source(config::File::from(local_config));
        }

        // User config in ~/.config/attesta/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("attesta").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with ATTESTA_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("ATTESTA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config to TOML")
    }

    /// Directory holding workflow definitions, if configured
    pub fn workflows_path(&self) -> Option<PathBuf> {
        self.workflows.dir.as_ref().map(|dir| {
            let path = PathBuf::from(dir);
            if path.is_absolute() {
                path
            } else {
                std::env::current_dir().unwrap_or_default().join(path)
            }
        })
    }

    /// Get absolute path to logs directory, if file logging is enabled
    pub fn logs_path(&self) -> Option<PathBuf> {
        self.logging.dir.as_ref().map(|dir| {
            let path = PathBuf::from(dir);
            if path.is_absolute() {
                path
            } else {
                std::env::current_dir().unwrap_or_default().join(path)
            }
        })
    }

    /// Absolute link for a path on this server
    pub fn public_link(&self, path: &str) -> String {
        format!("{}{}", self.server.public_url.trim_end_matches('/'), path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "0.0.0.0".to_string(),
                port: 8080,
                public_url: "http://localhost:8080".to_string(),
            },
            session: SessionConfig {
                ttl_hours: default_session_ttl(),
                cookie_secure: false,
            },
            auth: AuthConfig {
                legacy_cookie: false,
                signup: SignupPolicy::Disabled,
                invite_ttl_hours: default_invite_ttl(),
                reset_ttl_minutes: default_reset_ttl(),
                bootstrap_admin_email: None,
                bootstrap_admin_password: None,
            },
            attachments: AttachmentsConfig {
                max_bytes: default_max_upload(),
            },
            policy: PolicyConfig {
                base_url: "http://localhost:3592".to_string(),
                timeout_secs: default_http_timeout(),
            },
            identity: IdentityConfig::default(),
            workflows: WorkflowsConfig {
                dir: None,
                default_key: "demo".to_string(),
            },
            logging: LoggingConfig::default(),
        }
    }
}
