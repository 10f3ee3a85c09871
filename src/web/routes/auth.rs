//! Sign in, sign out, invitations, password resets and signup.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::html;
use crate::accounts::actor::cookie_value;
use crate::accounts::{AccountError, IssuedSession, SignupForm, SESSION_COOKIE};
use crate::store::TokenKind;
use crate::web::error::WebError;
use crate::web::session::{clear_session_cookie, session_cookie, MaybeViewer};
use crate::web::state::AppState;
use crate::web::views::Page;

/// Set the session cookie and go to the dashboard
fn signed_in(state: &AppState, session: &IssuedSession) -> Response {
    let max_age = state.config.session.ttl_hours * 3600;
    let cookie = session_cookie(&session.token, max_age, state.config.session.cookie_secure);
    ([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response()
}

fn with_cookie(cookie: HeaderValue, response: Result<Response, WebError>) -> Result<Response, WebError> {
    let mut response = response?;
    response.headers_mut().append(header::SET_COOKIE, cookie);
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

fn login_page(state: &AppState, status: StatusCode, email: &str, error: Option<String>) -> Result<Response, WebError> {
    html(
        status,
        "login",
        &Page::new(
            "Sign in",
            None,
            json!({ "email": email, "error": error, "signupOpen": state.accounts.signup_open() }),
        ),
    )
}

pub async fn login_form(State(state): State<AppState>, MaybeViewer(viewer): MaybeViewer) -> Result<Response, WebError> {
    if viewer.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    login_page(&state, StatusCode::OK, "", None)
}

pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Result<Response, WebError> {
    match state.accounts.login(&form.email, &form.password).await {
        Ok(session) => Ok(signed_in(&state, &session)),
        Err(AccountError::InvalidCredentials) => login_page(
            &state,
            StatusCode::UNAUTHORIZED,
            &form.email,
            Some(AccountError::InvalidCredentials.to_string()),
        ),
        Err(e) => Err(e.into()),
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, WebError> {
    let token = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| cookie_value(cookies, SESSION_COOKIE));
    if let Some(token) = token {
        state.accounts.logout(token).await?;
    }
    Ok(([(header::SET_COOKIE, clear_session_cookie())], Redirect::to("/login")).into_response())
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    pub password: String,
}

/// Render a token form, or 404 when the token cannot be redeemed
async fn token_page(
    state: &AppState,
    template: &str,
    title: &str,
    token: &str,
    kind: TokenKind,
    status: StatusCode,
    error: Option<String>,
) -> Result<Response, WebError> {
    if !state.accounts.token_is_valid(token, kind).await? {
        return Err(AccountError::InvalidToken.into());
    }
    html(
        status,
        template,
        &Page::new(title, None, json!({ "token": token, "error": error })),
    )
}

pub async fn invite_form(State(state): State<AppState>, Path(token): Path<String>) -> Result<Response, WebError> {
    token_page(&state, "invite", "Accept invitation", &token, TokenKind::Invite, StatusCode::OK, None).await
}

pub async fn accept_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<PasswordForm>,
) -> Result<Response, WebError> {
    match state.accounts.accept_invite(&token, &form.password).await {
        Ok(session) => Ok(signed_in(&state, &session)),
        Err(e @ AccountError::Password(_)) => {
            token_page(
                &state,
                "invite",
                "Accept invitation",
                &token,
                TokenKind::Invite,
                StatusCode::BAD_REQUEST,
                Some(e.to_string()),
            )
            .await
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetRequestForm {
    pub email: String,
}

pub async fn reset_request_form() -> Result<Response, WebError> {
    html(StatusCode::OK, "reset_request", &Page::new("Reset password", None, json!({})))
}

/// Same confirmation whether or not the email is known
pub async fn request_reset(
    State(state): State<AppState>,
    Form(form): Form<ResetRequestForm>,
) -> Result<Response, WebError> {
    state.accounts.request_reset(&form.email).await?;
    html(
        StatusCode::OK,
        "notice",
        &Page::new(
            "Reset password",
            None,
            json!({
                "heading": "Check your inbox",
                "message": "If an account exists for that address, a reset link has been issued.",
                "back": "/login",
            }),
        ),
    )
}

pub async fn reset_form(State(state): State<AppState>, Path(token): Path<String>) -> Result<Response, WebError> {
    token_page(&state, "reset_form", "Choose a new password", &token, TokenKind::Reset, StatusCode::OK, None).await
}

pub async fn complete_reset(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<PasswordForm>,
) -> Result<Response, WebError> {
    match state.accounts.complete_reset(&token, &form.password).await {
        Ok(_) => with_cookie(
            clear_session_cookie(),
            html(
                StatusCode::OK,
                "notice",
                &Page::new(
                    "Password changed",
                    None,
                    json!({
                        "heading": "Password changed",
                        "message": "Your password has been changed and other sessions were signed out.",
                        "back": "/login",
                    }),
                ),
            ),
        ),
        Err(e @ AccountError::Password(_)) => {
            token_page(
                &state,
                "reset_form",
                "Choose a new password",
                &token,
                TokenKind::Reset,
                StatusCode::BAD_REQUEST,
                Some(e.to_string()),
            )
            .await
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupInput {
    pub org_name: String,
    pub org_slug: String,
    #[serde(default)]
    pub display_name: String,
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

fn signup_page(status: StatusCode, form: &SignupInput, error: Option<String>) -> Result<Response, WebError> {
    html(
        status,
        "signup",
        &Page::new("Sign up", None, json!({ "form": form, "error": error })),
    )
}

pub async fn signup_form(State(state): State<AppState>) -> Result<Response, WebError> {
    if !state.accounts.signup_open() {
        return Err(AccountError::SignupDisabled.into());
    }
    signup_page(StatusCode::OK, &SignupInput::default(), None)
}

pub async fn signup(State(state): State<AppState>, Form(input): Form<SignupInput>) -> Result<Response, WebError> {
    let form = SignupForm {
        org_name: input.org_name.clone(),
        org_slug: input.org_slug.clone(),
        email: input.email.clone(),
        display_name: input.display_name.clone(),
        password: input.password.clone(),
    };
    match state.accounts.signup(form).await {
        Ok(session) => Ok(signed_in(&state, &session)),
        Err(e) if e.is_validation() => signup_page(StatusCode::BAD_REQUEST, &input, Some(e.to_string())),
        Err(e) => Err(e.into()),
    }
}
