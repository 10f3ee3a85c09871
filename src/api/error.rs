//! Errors from the external services attesta talks to

use std::fmt;

/// Errors that can occur when calling the policy engine or identity service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Network, connect or timeout failure
    NetworkError { provider: String, message: String },
    /// Non-success HTTP status
    HttpError {
        provider: String,
        status: u16,
        message: String,
    },
    /// Success status but the body could not be decoded
    MalformedResponse { provider: String, message: String },
}

impl UpstreamError {
    /// Get the provider name for this error
    pub fn provider_name(&self) -> &str {
        match self {
            UpstreamError::NetworkError { provider, .. } => provider,
            UpstreamError::HttpError { provider, .. } => provider,
            UpstreamError::MalformedResponse { provider, .. } => provider,
        }
    }

    /// HTTP status returned by the provider, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Create a network error for a provider
    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        UpstreamError::NetworkError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error for a provider
    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        UpstreamError::HttpError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a decode error for a provider
    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        UpstreamError::MalformedResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::NetworkError { provider, message } => {
                write!(f, "{}: Network error - {}", provider, message)
            }
            UpstreamError::HttpError {
                provider,
                status,
                message,
            } => {
                write!(f, "{}: HTTP {} - {}", provider, status, message)
            }
            UpstreamError::MalformedResponse { provider, message } => {
                write!(f, "{}: Malformed response - {}", provider, message)
            }
        }
    }
}

impl std::error::Error for UpstreamError {}
