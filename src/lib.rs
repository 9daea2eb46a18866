//! tjs - one-way sync of Taskwarrior tasks into JIRA
//!
//! Each pending task is mirrored by exactly one JIRA issue. The task → issue
//! mapping is cached locally so repeated passes only hit JIRA for tasks that
//! have never been seen.
//!
//! # Architecture
//!
//! - **sync**: Reconciliation passes, field mapping, issue resolution, polling daemon
//! - **integrations**: Issue tracker seam (JIRA REST client, in-memory tracker)
//! - **cache**: Persistent task → issue mapping
//! - **source**: Where pending tasks come from (Taskwarrior)
//! - **config**: YAML configuration and validation
//! - **auth**: Credential providers (pass, environment)

// Core modules
pub mod config;
pub mod error;
pub mod sync;

// Adapters
pub mod auth;
pub mod cache;
pub mod integrations;
pub mod source;

// CLI support
pub mod commands;
pub mod logging;
pub mod style;

// Re-exports
pub use error::{Result, TjsError};
