//! External Integrations
//!
//! The issue tracker seam and its implementations.
//!
//! # Overview
//!
//! The sync engine only depends on [`IssueTracker`]. Two trackers are
//! provided:
//!
//! - **JIRA**: REST API v2 client ([`JiraClient`])
//! - **In-memory**: state kept in process, for tests ([`InMemoryTracker`])
//!
//! [`ScopedTracker`] wraps either one to confine it to a single project.

pub mod jira;
pub mod memory;
pub mod tracker;

pub use jira::JiraClient;
pub use memory::{InMemoryTracker, StoredIssue, TrackerCall};
pub use tracker::{
    jql_field_ref, sanitize_jql_term, scope_jql, Issue, IssueFields, IssueHandle, IssueSnapshot,
    IssueTracker, IssueUpdate, NamedRef, NewIssue, RemoteLink, ScopedTracker,
};
