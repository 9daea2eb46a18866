//! Task → issue resolution
//!
//! Finds the one issue that belongs to a task, consulting the mapping cache
//! first when allowed. A task must never map to more than one issue; when
//! the tracker reports several, the keys are handed back untouched.

use crate::cache::MappingCache;
use crate::integrations::{jql_field_ref, sanitize_jql_term, IssueHandle, IssueTracker};
use crate::Result;
use tracing::{debug, warn};

/// Outcome of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(IssueHandle),
    NotFound,
    /// Keys of every issue claiming the task
    Duplicate(Vec<String>),
}

/// Cache-or-query issue lookup
pub struct IssueResolver<T> {
    tracker: T,
    cache: MappingCache,
    id_field: String,
    legacy_marker: String,
}

impl<T: IssueTracker> IssueResolver<T> {
    pub fn new(
        tracker: T,
        cache: MappingCache,
        id_field: impl Into<String>,
        legacy_marker: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            cache,
            id_field: id_field.into(),
            legacy_marker: legacy_marker.into(),
        }
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn cache(&self) -> &MappingCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut MappingCache {
        &mut self.cache
    }

    /// Find the issue for `identifier`
    ///
    /// With `use_cache`, a cached handle is returned without asking the
    /// tracker. Otherwise the tracker is searched; a single hit is cached.
    pub async fn resolve(&mut self, identifier: &str, use_cache: bool) -> Result<Resolution> {
        if use_cache {
            if let Some(handle) = self.cache.get(identifier) {
                debug!(task = %identifier, issue = %handle.key, "Resolved from cache");
                return Ok(Resolution::Found(handle.clone()));
            }
        }

        let jql = self.lookup_jql(identifier);
        let mut issues = self.tracker.search(&jql).await?;

        match issues.len() {
            0 => {
                debug!(task = %identifier, "No issue found");
                Ok(Resolution::NotFound)
            }
            1 => {
                let handle = issues.remove(0).handle();
                debug!(task = %identifier, issue = %handle.key, "Resolved by search");
                self.remember(identifier, handle.clone());
                Ok(Resolution::Found(handle))
            }
            _ => {
                let keys: Vec<String> = issues.into_iter().map(|i| i.key).collect();
                warn!(task = %identifier, issues = ?keys, "Task matches more than one issue");
                Ok(Resolution::Duplicate(keys))
            }
        }
    }

    /// Record the issue created for `identifier`
    ///
    /// Cache write failures are logged and otherwise ignored.
    pub fn remember(&mut self, identifier: &str, handle: IssueHandle) {
        if let Err(e) = self.cache.put(identifier, handle) {
            warn!(task = %identifier, error = %e, "Failed to persist mapping cache");
        }
    }

    /// JQL matching the identifier field or the legacy description marker
    pub fn lookup_jql(&self, identifier: &str) -> String {
        lookup_jql(&self.id_field, &self.legacy_marker, identifier)
    }
}

/// Build the lookup query for one task identifier
///
/// Numeric identifiers compare unquoted against the identifier field.
pub fn lookup_jql(id_field: &str, legacy_marker: &str, identifier: &str) -> String {
    let term = sanitize_jql_term(identifier);
    let value = if !term.is_empty() && term.chars().all(|c| c.is_ascii_digit()) {
        term.clone()
    } else {
        format!("\"{}\"", term)
    };
    let marker = legacy_marker.replace(['"', '\\'], "");

    format!(
        "({} = {} OR description ~ \"\\\"{}{}\\\"\")",
        jql_field_ref(id_field),
        value,
        marker,
        term
    )
}
