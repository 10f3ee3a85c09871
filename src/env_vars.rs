//! Centralized environment variable registry.
//!
//! Single source of truth for the environment variables attesta reads,
//! printed by `attesta env`.
//!
//! All variables use the `ATTESTA_` prefix with `__` separating nested
//! config paths (e.g., `ATTESTA_SESSION__TTL_HOURS`).

/// An environment variable definition
#[derive(Debug, Clone)]
pub struct EnvVar {
    /// Environment variable name (e.g., "ATTESTA_SESSION__TTL_HOURS")
    pub name: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Category for grouping in documentation
    pub category: EnvVarCategory,
    /// Default value if not set
    pub default: Option<&'static str>,
    /// Example value for documentation
    pub example: Option<&'static str>,
}

/// Categories for organizing environment variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvVarCategory {
    Server,
    Sessions,
    Accounts,
    Attachments,
    Policy,
    Identity,
    Workflows,
    Logging,
}

impl EnvVarCategory {
    /// Display name for this category
    pub fn display_name(&self) -> &'static str {
        match self {
            EnvVarCategory::Server => "Server",
            EnvVarCategory::Sessions => "Sessions",
            EnvVarCategory::Accounts => "Accounts",
            EnvVarCategory::Attachments => "Attachments",
            EnvVarCategory::Policy => "Policy Engine",
            EnvVarCategory::Identity => "Identity Service",
            EnvVarCategory::Workflows => "Workflows",
            EnvVarCategory::Logging => "Logging",
        }
    }

    /// All categories in display order
    pub fn all() -> &'static [EnvVarCategory] {
        &[
            EnvVarCategory::Server,
            EnvVarCategory::Sessions,
            EnvVarCategory::Accounts,
            EnvVarCategory::Attachments,
            EnvVarCategory::Policy,
            EnvVarCategory::Identity,
            EnvVarCategory::Workflows,
            EnvVarCategory::Logging,
        ]
    }
}

/// Static registry of all documented environment variables
pub static ENV_VARS: &[EnvVar] = &[
    // === Server ===
    EnvVar {
        name: "ATTESTA_SERVER__PORT",
        description: "TCP port the HTTP server listens on",
        category: EnvVarCategory::Server,
        default: Some("8080"),
        example: Some("9000"),
    },
    EnvVar {
        name: "ATTESTA_SERVER__PUBLIC_URL",
        description: "Externally visible base URL, used for invite and reset links",
        category: EnvVarCategory::Server,
        default: Some("http://localhost:8080"),
        example: Some("https://attesta.example.com"),
    },
    // === Sessions ===
    EnvVar {
        name: "ATTESTA_SESSION__TTL_HOURS",
        description: "Lifetime of a login session in hours",
        category: EnvVarCategory::Sessions,
        default: Some("12"),
        example: Some("8"),
    },
    EnvVar {
        name: "ATTESTA_SESSION__COOKIE_SECURE",
        description: "Mark the session cookie Secure (serve over HTTPS)",
        category: EnvVarCategory::Sessions,
        default: Some("false"),
        example: Some("true"),
    },
    // === Accounts ===
    EnvVar {
        name: "ATTESTA_AUTH__LEGACY_COOKIE",
        description: "Accept the demo_user cookie (userID|role|workflowKey) without a session",
        category: EnvVarCategory::Accounts,
        default: Some("false"),
        example: Some("true"),
    },
    EnvVar {
        name: "ATTESTA_AUTH__SIGNUP",
        description: "Self-service organization signup policy (disabled, open)",
        category: EnvVarCategory::Accounts,
        default: Some("disabled"),
        example: Some("open"),
    },
    EnvVar {
        name: "ATTESTA_AUTH__INVITE_TTL_HOURS",
        description: "Lifetime of invite links in hours",
        category: EnvVarCategory::Accounts,
        default: Some("72"),
        example: Some("24"),
    },
    EnvVar {
        name: "ATTESTA_AUTH__RESET_TTL_MINUTES",
        description: "Lifetime of password reset links in minutes",
        category: EnvVarCategory::Accounts,
        default: Some("60"),
        example: Some("15"),
    },
    EnvVar {
        name: "ATTESTA_AUTH__BOOTSTRAP_ADMIN_EMAIL",
        description: "Email of the platform admin created at startup when missing",
        category: EnvVarCategory::Accounts,
        default: None,
        example: Some("admin@example.com"),
    },
    EnvVar {
        name: "ATTESTA_AUTH__BOOTSTRAP_ADMIN_PASSWORD",
        description: "Password of the bootstrap platform admin",
        category: EnvVarCategory::Accounts,
        default: None,
        example: Some("change-me-please"),
    },
    // === Attachments ===
    EnvVar {
        name: "ATTESTA_ATTACHMENTS__MAX_BYTES",
        description: "Largest accepted file upload in bytes",
        category: EnvVarCategory::Attachments,
        default: Some("10485760"),
        example: Some("52428800"),
    },
    // === Policy ===
    EnvVar {
        name: "ATTESTA_POLICY__BASE_URL",
        description: "Base URL of the Cerbos policy decision point",
        category: EnvVarCategory::Policy,
        default: Some("http://localhost:3592"),
        example: Some("http://cerbos:3592"),
    },
    EnvVar {
        name: "ATTESTA_POLICY__TIMEOUT_SECS",
        description: "Timeout for a single authorization call",
        category: EnvVarCategory::Policy,
        default: Some("10"),
        example: Some("3"),
    },
    // === Identity ===
    EnvVar {
        name: "ATTESTA_IDENTITY__BASE_URL",
        description: "Base URL of the identity service; team enrichment is off when empty",
        category: EnvVarCategory::Identity,
        default: None,
        example: Some("https://api.identity.example.com"),
    },
    EnvVar {
        name: "ATTESTA_IDENTITY__API_KEY",
        description: "API key sent as X-Api-Key to the identity service",
        category: EnvVarCategory::Identity,
        default: None,
        example: Some("sk_live_..."),
    },
    EnvVar {
        name: "ATTESTA_IDENTITY__PROJECT_ID",
        description: "Project sent as X-Project-Id to the identity service",
        category: EnvVarCategory::Identity,
        default: None,
        example: Some("proj_123"),
    },
    EnvVar {
        name: "ATTESTA_IDENTITY__LOOKUP_MODE",
        description: "Team lookup failure handling (fail_open, strict)",
        category: EnvVarCategory::Identity,
        default: Some("fail_open"),
        example: Some("strict"),
    },
    // === Workflows ===
    EnvVar {
        name: "ATTESTA_WORKFLOWS__DIR",
        description: "Directory of YAML workflow definitions",
        category: EnvVarCategory::Workflows,
        default: None,
        example: Some("./workflows"),
    },
    EnvVar {
        name: "ATTESTA_WORKFLOWS__DEFAULT_KEY",
        description: "Workflow that unscoped legacy routes redirect to",
        category: EnvVarCategory::Workflows,
        default: Some("demo"),
        example: Some("iso27001"),
    },
    // === Logging ===
    EnvVar {
        name: "ATTESTA_LOGGING__LEVEL",
        description: "Log level filter (trace, debug, info, warn, error); RUST_LOG overrides",
        category: EnvVarCategory::Logging,
        default: Some("info"),
        example: Some("debug"),
    },
    EnvVar {
        name: "ATTESTA_LOGGING__DIR",
        description: "Write logs to a timestamped file in this directory",
        category: EnvVarCategory::Logging,
        default: None,
        example: Some("./logs"),
    },
];

/// Iterate the variables of one category
pub fn env_vars_for_category(category: EnvVarCategory) -> impl Iterator<Item = &'static EnvVar> {
    ENV_VARS.iter().filter(move |v| v.category == category)
}

/// Variables grouped by category, empty categories omitted
pub fn env_vars_by_category() -> Vec<(EnvVarCategory, Vec<&'static EnvVar>)> {
    EnvVarCategory::all()
        .iter()
        .map(|cat| {
            let vars: Vec<&EnvVar> = env_vars_for_category(*cat).collect();
            (*cat, vars)
        })
        .filter(|(_, vars)| !vars.is_empty())
        .collect()
}

/// Plain-text listing used by `attesta env`
pub fn render_text() -> String {
    let mut out = String::new();
    for (category, vars) in env_vars_by_category() {
        out.push_str(&format!("# {}\n", category.display_name()));
        for var in vars {
            out.push_str(&format!("{}\n    {}\n", var.name, var.description));
            if let Some(default) = var.default {
                out.push_str(&format!("    default: {}\n", default));
            }
            if let Some(example) = var.example {
                out.push_str(&format!("    example: {}\n", example));
            }
        }
        out.push('\n');
    }
    out
}
