//! HTML and JSON web surface.
//!
//! Pages are server-rendered with Handlebars and refreshed in place by HTMX;
//! live updates arrive over server-sent events. Every workflow page lives
//! under `/w/{workflowKey}`.

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod dto;
pub mod error;
pub mod openapi;
pub mod render;
pub mod routes;
pub mod session;
pub mod state;
pub mod views;

pub use error::{ApiError, WebError};
pub use openapi::ApiDoc;
pub use state::AppState;

/// Room for form fields around the uploaded files
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Request body cap: one full file per file input of the widest substep,
/// one more for headroom, plus the form fields
fn body_limit(state: &AppState) -> usize {
    let file_parts = state
        .registry
        .iter()
        .map(|def| def.max_file_inputs())
        .max()
        .unwrap_or(0);
    state
        .config
        .attachments
        .max_bytes
        .saturating_mul(file_parts + 1)
        .saturating_add(FORM_OVERHEAD_BYTES)
}

/// Build the router with all routes
pub fn build_router(state: AppState) -> Router {
    let body_limit = body_limit(&state);

    Router::new()
        // JSON API
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/status", get(routes::health::status))
        .route("/api/v1/workflows", get(routes::api::list_workflows))
        .route("/api/v1/w/:key/processes/:id", get(routes::api::get_process))
        // Workflow pages
        .route("/", get(routes::dashboard::root))
        .route("/w/:key", get(routes::dashboard::dashboard))
        .route("/w/:key/", get(routes::dashboard::dashboard))
        .route("/w/:key/process/start", post(routes::dashboard::start_process))
        .route("/w/:key/process/:id", get(routes::process::show))
        .route(
            "/w/:key/process/:id/substep/:substep/complete",
            post(routes::process::complete),
        )
        .route(
            "/w/:key/process/:id/substep/:substep/file",
            get(routes::files::download),
        )
        .route(
            "/w/:key/process/:id/notarized.json",
            get(routes::files::notarized_json),
        )
        .route("/w/:key/process/:id/files.zip", get(routes::files::files_zip))
        .route("/w/:key/events", get(routes::events::stream))
        // Accounts
        .route("/login", get(routes::auth::login_form).post(routes::auth::login))
        .route("/logout", get(routes::auth::logout).post(routes::auth::logout))
        .route(
            "/invite/:token",
            get(routes::auth::invite_form).post(routes::auth::accept_invite),
        )
        .route(
            "/reset",
            get(routes::auth::reset_request_form).post(routes::auth::request_reset),
        )
        .route(
            "/reset/:token",
            get(routes::auth::reset_form).post(routes::auth::complete_reset),
        )
        .route("/signup", get(routes::auth::signup_form).post(routes::auth::signup))
        // Administration
        .route(
            "/admin/orgs",
            get(routes::admin::list_orgs).post(routes::admin::create_org),
        )
        .route("/admin/sync-teams", post(routes::admin::sync))
        .route(
            "/org-admin/roles",
            get(routes::admin::list_roles).post(routes::admin::create_role),
        )
        .route(
            "/org-admin/users",
            get(routes::admin::list_users).post(routes::admin::invite_user),
        )
        // Legacy unscoped paths
        .route("/process/start", post(routes::legacy::start_process))
        .route("/process/:id", get(routes::legacy::process))
        .route(
            "/process/:id/substep/:substep/complete",
            post(routes::legacy::complete),
        )
        .route("/events", get(routes::legacy::events))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server on the configured address
pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.bind, state.config.server.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Attesta listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::test_state;
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::notary::sha256_hex;
    use crate::store::{AttachmentStore, InMemoryStore, NotarizationStore, ProcessStore};
    use crate::workflow::{WorkflowDef, WorkflowRegistry};

    const BOUNDARY: &str = "attesta-test-boundary";

    fn legacy_cookie(role: &str) -> String {
        format!("demo_user=u-{}|{}|demo", role, role)
    }

    async fn send(app: &Router, request: Request<Body>) -> axum::response::Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    fn location(response: &axum::response::Response) -> String {
        response.headers()[header::LOCATION].to_str().unwrap().to_string()
    }

    async fn start(app: &Router, role: &str) -> String {
        let response = send(
            app,
            Request::post("/w/demo/process/start")
                .header(header::COOKIE, legacy_cookie(role))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        location(&response).rsplit('/').next().unwrap().to_string()
    }

    fn complete_form(process_id: &str, substep: &str, role: &str, body: &str) -> Request<Body> {
        Request::post(format!("/w/demo/process/{}/substep/{}/complete", process_id, substep))
            .header(header::COOKIE, legacy_cookie(role))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("HX-Request", "true")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn complete_upload(process_id: &str, substep: &str, role: &str, field: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"policy.txt\"\r\nContent-Type: text/plain\r\n\r\n",
                b = BOUNDARY,
                f = field
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::post(format!("/w/demo/process/{}/substep/{}/complete", process_id, substep))
            .header(header::COOKIE, legacy_cookie(role))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_as(uri: &str, role: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::COOKIE, legacy_cookie(role))
            .body(Body::empty())
            .unwrap()
    }

    /// Next SSE frame of a streaming body as text
    async fn next_frame(body: &mut Body) -> String {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("event within timeout")
            .unwrap()
            .unwrap();
        String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _) = test_state(false);
        let app = build_router(state);
        let response = send(&app, Request::get("/api/v1/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("\"ok\""));
    }

    #[tokio::test]
    async fn test_root_redirects_to_default_workflow() {
        let (state, _) = test_state(false);
        let app = build_router(state);
        let response = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/w/demo/");
    }

    #[tokio::test]
    async fn test_anonymous_page_redirects_to_login() {
        let (state, _) = test_state(false);
        let app = build_router(state);
        let response = send(&app, Request::get("/w/demo/").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn test_legacy_cookie_ignored_when_disabled() {
        let (state, _) = test_state(false);
        let app = build_router(state);
        let response = send(
            &app,
            Request::get("/w/demo/")
                .header(header::COOKIE, legacy_cookie("dep1"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_anonymous_completion_is_unauthorized() {
        let (state, _) = test_state(false);
        let app = build_router(state);
        let response = send(
            &app,
            Request::post("/w/demo/process/p1/substep/1.1/complete")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("policy_owner=Ada"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_completion_flow_over_http() {
        let (state, store) = test_state(true);
        let app = build_router(state);
        let id = start(&app, "dep1").await;

        let page = send(
            &app,
            Request::get(format!("/w/demo/process/{}", id))
                .header(header::COOKIE, legacy_cookie("dep1"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(page.status(), StatusCode::OK);
        let html = body_text(page).await;
        assert!(html.contains("<!DOCTYPE html>"));
        assert!(html.contains("Name the policy owner"));

        // Out of order: locked even for the right role
        let response = send(&app, complete_form(&id, "2.1", "dep2", "review.reviewer=Bo")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(body_text(response).await.contains("locked"));

        // Wrong role for an open substep
        let response = send(&app, complete_form(&id, "1.1", "dep2", "policy_owner=Ada")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, complete_form(&id, "1.1", "dep1", "policy_owner=Ada")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let partial = body_text(response).await;
        assert!(partial.contains("Step completed."));
        assert!(!partial.contains("<!DOCTYPE html>"));

        let response = send(&app, complete_form(&id, "1.1", "dep1", "policy_owner=Ada")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        assert_eq!(store.list_notarizations(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_and_download_round_trip() {
        let (state, store) = test_state(true);
        let app = build_router(state);
        let id = start(&app, "dep1").await;
        send(&app, complete_form(&id, "1.1", "dep1", "policy_owner=Ada")).await;

        let bytes = b"signed policy v1".to_vec();
        let response = send(&app, complete_upload(&id, "1.2", "dep1", "policy_document", &bytes)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let stored = store.list_attachments(&id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sha256, sha256_hex(&bytes));

        let response = send(
            &app,
            Request::get(format!("/w/demo/process/{}/substep/1.2/file", id))
                .header(header::COOKIE, legacy_cookie("dep2"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let downloaded = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(downloaded.as_ref(), bytes.as_slice());

        let response = send(
            &app,
            Request::get(format!("/w/demo/process/{}/notarized.json", id))
                .header(header::COOKIE, legacy_cookie("dep2"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        let export: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(export["verified"], true);
        assert_eq!(export["notarizations"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let (state, store) = test_state(true);
        let app = build_router(state);
        let id = start(&app, "dep1").await;
        send(&app, complete_form(&id, "1.1", "dep1", "policy_owner=Ada")).await;

        let response = send(&app, complete_upload(&id, "1.2", "dep1", "policy_document", &[b'x'; 2048])).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let process = store.get_process(&id).await.unwrap().unwrap();
        assert!(!process.is_step_done("1.2"));
    }

    #[tokio::test]
    async fn test_api_process_json() {
        let (state, _) = test_state(true);
        let app = build_router(state);
        let id = start(&app, "dep1").await;

        let response = send(
            &app,
            Request::get(format!("/api/v1/w/demo/processes/{}", id))
                .header(header::COOKIE, legacy_cookie("dep1"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["substeps"][0]["available"], true);
        assert_eq!(json["substeps"][1]["available"], false);

        let response = send(
            &app,
            Request::get("/api/v1/w/demo/processes/missing")
                .header(header::COOKIE, legacy_cookie("dep1"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_legacy_workflow_mismatch_is_forbidden() {
        let (state, _) = test_state(true);
        let app = build_router(state);
        let response = send(
            &app,
            Request::get("/w/demo/")
                .header(header::COOKIE, "demo_user=u1|dep1|other")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_legacy_paths_redirect() {
        let (state, _) = test_state(true);
        let app = build_router(state);

        let response = send(&app, Request::get("/process/abc").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(location(&response), "/w/demo/process/abc");

        let response = send(&app, Request::get("/events?role=dep1").body(Body::empty()).unwrap()).await;
        assert_eq!(location(&response), "/w/demo/events?role=dep1");

        let response = send(&app, Request::post("/process/start").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(location(&response), "/w/demo/process/start");
    }

    #[tokio::test]
    async fn test_login_sets_session_cookie() {
        let (state, _) = test_state(false);
        state
            .accounts
            .ensure_bootstrap_admin("root@attesta.io", "bootstrap-pass")
            .await
            .unwrap();
        let app = build_router(state);

        let response = send(
            &app,
            Request::post("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("email=root%40attesta.io&password=wrong-password"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("Invalid email or password."));

        let response = send(
            &app,
            Request::post("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("email=root%40attesta.io&password=bootstrap-pass"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("attesta_session="));
        let pair = cookie.split(';').next().unwrap().to_string();

        let response = send(
            &app,
            Request::get("/admin/orgs")
                .header(header::COOKIE, pair)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_signup_disabled_is_not_found() {
        let (state, _) = test_state(false);
        let app = build_router(state);
        let response = send(&app, Request::get("/signup").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_large_upload_to_gated_step_reports_gate() {
        let (state, store) = test_state(true);
        let app = build_router(state);
        let id = start(&app, "dep1").await;
        let large = vec![b'x'; 200 * 1024];

        let response = send(&app, complete_upload(&id, "1.2", "dep1", "policy_document", &large)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        send(&app, complete_form(&id, "1.1", "dep1", "policy_owner=Ada")).await;
        let response = send(&app, complete_upload(&id, "1.2", "dep2", "policy_document", &large)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Allowed and in sequence: only now is the size reported
        let response = send(&app, complete_upload(&id, "1.2", "dep1", "policy_document", &large)).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(store.list_attachments(&id).await.unwrap().is_empty());
    }

    #[test]
    fn test_body_limit_scales_with_file_inputs() {
        let yaml = r#"
key: evidence
title: Evidence
steps:
  - id: "1"
    title: Collect
    order: 1
    substeps:
      - id: "1.1"
        title: Bundle
        order: 1
        role: dep1
        input_key: bundle
        input_type: group
        fields:
          - { key: contract, label: Contract, input_type: file }
          - { key: invoice, label: Invoice, input_type: file }
          - { key: note, label: Note, input_type: string }
"#;
        let (demo, _) = test_state(false);
        assert_eq!(body_limit(&demo), 1024 * 2 + FORM_OVERHEAD_BYTES);

        let registry = WorkflowRegistry::from_defs(vec![WorkflowDef::from_yaml(yaml).unwrap()]).unwrap();
        let mut config = crate::config::Config::default();
        config.attachments.max_bytes = 1024;
        let state = AppState::new(
            config,
            Arc::new(registry),
            Arc::new(InMemoryStore::new()),
            Arc::new(super::test_support::RoleAuthorizer),
        );
        assert_eq!(body_limit(&state), 1024 * 3 + FORM_OVERHEAD_BYTES);
    }

    #[tokio::test]
    async fn test_events_require_a_channel() {
        let (state, _) = test_state(true);
        let app = build_router(state);
        let response = send(&app, get_as("/w/demo/events", "dep1")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_events_for_other_role_are_forbidden() {
        let (state, _) = test_state(true);
        let app = build_router(state);
        let response = send(&app, get_as("/w/demo/events?role=dep2", "dep1")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_events_for_unknown_process_not_found() {
        let (state, _) = test_state(true);
        let app = build_router(state);
        let response = send(&app, get_as("/w/demo/events?processId=missing", "dep1")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_events_stream_completion_updates() {
        let (state, _) = test_state(true);
        let app = build_router(state);
        let id = start(&app, "dep1").await;

        let response = send(&app, get_as(&format!("/w/demo/events?processId={}", id), "dep2")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        let mut process_body = response.into_body();

        let response = send(&app, get_as("/w/demo/events?role=dep1", "dep1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let mut role_body = response.into_body();

        let response = send(&app, complete_form(&id, "1.1", "dep1", "policy_owner=Ada")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let frame = next_frame(&mut process_body).await;
        assert!(frame.contains("event: process-updated\n"), "{}", frame);
        assert!(frame.contains(&format!("data: {}\n", id)), "{}", frame);

        let frame = next_frame(&mut role_body).await;
        assert!(frame.contains("event: role-updated\n"), "{}", frame);
        assert!(frame.contains(&format!("data: {}\n", id)), "{}", frame);
    }
}
