//! OpenAPI specification builder using utoipa.

use utoipa::OpenApi;

use crate::web::dto::{
    HealthResponse, ProcessResponse, StatusResponse, SubstepResponse, SubstepStatusResponse,
    WorkflowResponse,
};
use crate::web::error::ErrorResponse;

/// OpenAPI documentation for the Attesta JSON API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attesta API",
        version = "0.3.2",
        description = "Read-only JSON API over compliance workflows and their processes.",
        license(name = "MIT")
    ),
    paths(
        // Health endpoints
        crate::web::routes::health::health,
        crate::web::routes::health::status,
        // Workflow endpoints
        crate::web::routes::api::list_workflows,
        // Process endpoints
        crate::web::routes::api::get_process,
    ),
    components(
        schemas(
            HealthResponse,
            StatusResponse,
            WorkflowResponse,
            SubstepResponse,
            ProcessResponse,
            SubstepStatusResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check and status endpoints"),
        (name = "Workflows", description = "Loaded workflow definitions"),
        (name = "Processes", description = "Process progress and availability"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI specification as a JSON string
    pub fn json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }

    /// Generate the OpenAPI specification as a YAML string
    pub fn yaml() -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&Self::openapi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::json().expect("Failed to generate OpenAPI spec");
        assert!(spec.contains("Attesta API"));
        assert!(spec.contains("/api/v1/health"));
        assert!(spec.contains("/api/v1/w/{key}/processes/{id}"));
    }

    #[test]
    fn test_openapi_has_all_tags() {
        let spec = ApiDoc::json().expect("Failed to generate OpenAPI spec");
        assert!(spec.contains("\"Health\""));
        assert!(spec.contains("\"Workflows\""));
        assert!(spec.contains("\"Processes\""));
    }

    #[test]
    fn test_openapi_yaml() {
        let spec = ApiDoc::yaml().expect("Failed to generate OpenAPI spec");
        assert!(spec.contains("openapi:"));
    }
}
