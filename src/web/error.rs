//! Error responses for pages and the JSON API.

use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::accounts::AccountError;
use crate::authz::IdentityError;
use crate::process::CompletionError;
use crate::store::StoreError;
use crate::web::render;

/// Web error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebError {
    /// Missing process, substep, attachment or workflow
    NotFound(String),
    /// Malformed form or invalid value
    BadRequest(String),
    /// No identity on a page request; redirects to the login page
    LoginRequired,
    /// No identity or wrong credentials
    Unauthorized(String),
    /// Policy deny or missing privileges
    Forbidden(String),
    /// Sequence gate violation or already completed step
    Conflict(String),
    PayloadTooLarge(String),
    /// Policy engine or identity service failure
    BadGateway(String),
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::LoginRequired | WebError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            WebError::Forbidden(_) => StatusCode::FORBIDDEN,
            WebError::Conflict(_) => StatusCode::CONFLICT,
            WebError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            WebError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            WebError::NotFound(_) => "not_found",
            WebError::BadRequest(_) => "bad_request",
            WebError::LoginRequired | WebError::Unauthorized(_) => "unauthorized",
            WebError::Forbidden(_) => "forbidden",
            WebError::Conflict(_) => "conflict",
            WebError::PayloadTooLarge(_) => "payload_too_large",
            WebError::BadGateway(_) => "bad_gateway",
            WebError::Internal(_) => "internal_error",
        }
    }

    /// Human-readable message shown to the user
    pub fn message(&self) -> String {
        match self {
            WebError::LoginRequired => "Please sign in.".to_string(),
            WebError::NotFound(msg)
            | WebError::BadRequest(msg)
            | WebError::Unauthorized(msg)
            | WebError::Forbidden(msg)
            | WebError::Conflict(msg)
            | WebError::PayloadTooLarge(msg)
            | WebError::BadGateway(msg)
            | WebError::Internal(msg) => msg.clone(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        WebError::NotFound(format!("{} not found.", what))
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if self == WebError::LoginRequired {
            return Redirect::to("/login").into_response();
        }
        let status = self.status();
        let message = self.message();
        let body = render::pages()
            .render(
                "error",
                &json!({ "title": status.canonical_reason().unwrap_or("Error"), "status": status.as_u16(), "message": message }),
            )
            .unwrap_or_else(|_| message.clone());
        (status, Html(body)).into_response()
    }
}

/// JSON flavour of [`WebError`] for `/api/v1`
#[derive(Debug)]
pub struct ApiError(pub WebError);

impl<E: Into<WebError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.0.kind().to_string(),
                message: self.0.message(),
            }),
        )
            .into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Cookie"));
        }
        response
    }
}

impl From<CompletionError> for WebError {
    fn from(err: CompletionError) -> Self {
        let message = err.to_string();
        match err {
            CompletionError::ProcessNotFound(_)
            | CompletionError::WorkflowNotFound(_)
            | CompletionError::SubstepNotFound(_) => WebError::NotFound(message),
            CompletionError::AlreadyDone | CompletionError::Locked => WebError::Conflict(message),
            CompletionError::Forbidden => WebError::Forbidden(message),
            CompletionError::Authorization(_) => {
                WebError::BadGateway("The authorization service is unavailable.".to_string())
            }
            CompletionError::InvalidPayload(e) if e.is_too_large() => {
                WebError::PayloadTooLarge(message)
            }
            CompletionError::InvalidPayload(_) => WebError::BadRequest(message),
            CompletionError::Storage(_) | CompletionError::NotarizationFailed(_) => {
                WebError::Internal(message)
            }
        }
    }
}

impl From<AccountError> for WebError {
    fn from(err: AccountError) -> Self {
        let message = err.to_string();
        match err {
            AccountError::InvalidCredentials => WebError::Unauthorized(message),
            AccountError::InvalidToken | AccountError::SignupDisabled | AccountError::OrgNotFound => {
                WebError::NotFound(message)
            }
            AccountError::Store(_) => WebError::Internal(message),
            ref e if e.is_validation() => WebError::BadRequest(message),
            _ => WebError::Internal(message),
        }
    }
}

impl From<StoreError> for WebError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, .. } => WebError::not_found(kind),
            StoreError::Duplicate { .. } => WebError::BadRequest(err.to_string()),
            StoreError::Backend(msg) => WebError::Internal(msg),
        }
    }
}

impl From<IdentityError> for WebError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Disabled => {
                WebError::BadRequest("The identity service is not configured.".to_string())
            }
            IdentityError::Upstream(e) => {
                WebError::BadGateway(format!("Identity service request failed: {}", e))
            }
            IdentityError::Store(e) => e.into(),
        }
    }
}

impl From<anyhow::Error> for WebError {
    fn from(err: anyhow::Error) -> Self {
        WebError::Internal(err.to_string())
    }
}
