//! Attesta - multi-tenant compliance workflow back-office
//!
//! Workflows are ordered trees of steps and substeps. Each completion is
//! gated by sequence, authorized by a Cerbos policy decision point, recorded
//! on the process and notarized with a SHA-256 digest.

pub mod accounts;
pub mod api;
pub mod authz;
pub mod config;
pub mod env_vars;
pub mod events;
pub mod logging;
pub mod notary;
pub mod process;
pub mod store;
pub mod web;
pub mod workflow;
