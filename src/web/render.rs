//! Handlebars page templates compiled into the binary.

use handlebars::Handlebars;
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::error;

use super::error::WebError;

const LAYOUT: &str = include_str!("templates/layout.hbs");

/// Template name and source, registered at first use
const TEMPLATES: &[(&str, &str)] = &[
    ("error", include_str!("templates/error.hbs")),
    ("notice", include_str!("templates/notice.hbs")),
    ("dashboard", include_str!("templates/dashboard.hbs")),
    ("process", include_str!("templates/process.hbs")),
    ("process_partial", include_str!("templates/process_partial.hbs")),
    ("login", include_str!("templates/login.hbs")),
    ("invite", include_str!("templates/invite.hbs")),
    ("reset_request", include_str!("templates/reset_request.hbs")),
    ("reset_form", include_str!("templates/reset_form.hbs")),
    ("signup", include_str!("templates/signup.hbs")),
    ("admin_orgs", include_str!("templates/admin_orgs.hbs")),
    ("org_roles", include_str!("templates/org_roles.hbs")),
    ("org_users", include_str!("templates/org_users.hbs")),
];

static PAGES: Lazy<Pages> = Lazy::new(Pages::new);

/// Shared page renderer
pub fn pages() -> &'static Pages {
    &PAGES
}

pub struct Pages {
    handlebars: Handlebars<'static>,
}

impl Pages {
    fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);

        if let Err(e) = handlebars.register_partial("layout", LAYOUT) {
            error!(error = %e, "Failed to register layout");
        }
        // The process body is shared by the full page and the HTMX partial
        if let Err(e) = handlebars.register_partial("process_body", include_str!("templates/process_body.hbs")) {
            error!(error = %e, "Failed to register process body");
        }
        for (name, source) in TEMPLATES {
            if let Err(e) = handlebars.register_template_string(name, *source) {
                error!(template = %name, error = %e, "Failed to register template");
            }
        }
        Self { handlebars }
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, WebError> {
        self.handlebars.render(name, data).map_err(|e| {
            error!(template = %name, error = %e, "Template rendering failed");
            WebError::Internal(format!("Failed to render page: {}", e))
        })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }
}
