//! Clients for the external services attesta integrates with
//!
//! - `cerbos`: policy decision point used to authorize substep completion
//! - `identity`: identity service holding external teams and memberships

pub mod cerbos;
pub mod error;
pub mod identity;

pub use cerbos::{CerbosClient, CheckRequest, CheckResponse};
pub use error::UpstreamError;
pub use identity::{CreateOutcome, IdentityClient};
