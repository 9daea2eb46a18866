//! Remote issue tracker capability
//!
//! The sync engine talks to the tracker only through [`IssueTracker`]:
//! search, create, update, add a label, add a link. [`ScopedTracker`] pins
//! every call to one project by wrapping a plain tracker.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reference to a remote issue, as stored in the mapping cache
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueHandle {
    /// Human-readable key (e.g. "VS-123")
    pub key: String,
    /// Tracker-internal id
    pub id: String,
}

impl IssueHandle {
    pub fn new(key: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for IssueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Issue as returned by a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub id: String,
    #[serde(default)]
    pub fields: IssueSnapshot,
}

impl Issue {
    pub fn handle(&self) -> IssueHandle {
        IssueHandle::new(&self.key, &self.id)
    }
}

/// Field values of a fetched issue
///
/// Fields the sync engine cares about are typed; everything else the tracker
/// returned is kept in `other` for verbose listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueSnapshot {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(rename = "issuetype", default)]
    pub issue_type: Option<NamedRef>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// A `{ "name": ..., "id": ... }` reference (issue type, status, priority)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// Titled hyperlink attached to an issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLink {
    pub url: String,
    pub title: String,
}

impl RemoteLink {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Field set derived from a task
///
/// `links` are not part of the issue body; they are added one by one with
/// [`IssueTracker::add_link`] after the issue exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueFields {
    pub summary: String,
    pub description: String,
    /// In order, duplicates kept
    pub labels: Vec<String>,
    pub issue_type: String,
    /// JIRA time-tracking notation, e.g. "30m"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_estimate: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<RemoteLink>,
}

/// Request to create an issue
#[derive(Debug, Clone)]
pub struct NewIssue {
    /// Project key
    pub project: String,
    pub fields: IssueFields,
    /// Extra fields by tracker field id (e.g. the task identifier field)
    pub custom_fields: BTreeMap<String, Value>,
}

impl NewIssue {
    pub fn new(project: impl Into<String>, fields: IssueFields) -> Self {
        Self {
            project: project.into(),
            fields,
            custom_fields: BTreeMap::new(),
        }
    }

    pub fn with_custom_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_fields.insert(field.into(), value.into());
        self
    }
}

/// Partial update of an existing issue; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueUpdate {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub issue_type: Option<String>,
    pub original_estimate: Option<String>,
    /// `Some(vec![])` clears all labels
    pub labels: Option<Vec<String>>,
}

impl IssueUpdate {
    /// Update that overwrites the body fields of `fields`, leaving labels alone
    pub fn from_fields(fields: &IssueFields) -> Self {
        Self {
            summary: Some(fields.summary.clone()),
            description: Some(fields.description.clone()),
            issue_type: Some(fields.issue_type.clone()),
            original_estimate: fields.original_estimate.clone(),
            labels: None,
        }
    }

    /// Also replace the label set
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Capabilities the sync engine needs from an issue tracker
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Run a JQL query, returning every matching issue
    async fn search(&self, jql: &str) -> Result<Vec<Issue>>;

    /// Create an issue
    async fn create(&self, issue: &NewIssue) -> Result<IssueHandle>;

    /// Apply a partial update
    async fn update(&self, key: &str, update: &IssueUpdate) -> Result<()>;

    /// Add one label, keeping existing ones
    async fn add_label(&self, key: &str, label: &str) -> Result<()>;

    /// Attach a titled link, keeping existing ones
    async fn add_link(&self, key: &str, link: &RemoteLink) -> Result<()>;
}

#[async_trait]
impl<T: IssueTracker + ?Sized> IssueTracker for Arc<T> {
    async fn search(&self, jql: &str) -> Result<Vec<Issue>> {
        (**self).search(jql).await
    }

    async fn create(&self, issue: &NewIssue) -> Result<IssueHandle> {
        (**self).create(issue).await
    }

    async fn update(&self, key: &str, update: &IssueUpdate) -> Result<()> {
        (**self).update(key, update).await
    }

    async fn add_label(&self, key: &str, label: &str) -> Result<()> {
        (**self).add_label(key, label).await
    }

    async fn add_link(&self, key: &str, link: &RemoteLink) -> Result<()> {
        (**self).add_link(key, link).await
    }
}

/// Tracker wrapper that confines every call to one project
///
/// Searches get a `project = KEY AND (...)` prefix and created issues always
/// land in `KEY`, whatever the request says.
#[derive(Debug, Clone)]
pub struct ScopedTracker<T> {
    inner: T,
    project: String,
}

impl<T: IssueTracker> ScopedTracker<T> {
    pub fn new(inner: T, project: impl Into<String>) -> Self {
        Self {
            inner,
            project: project.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: IssueTracker> IssueTracker for ScopedTracker<T> {
    async fn search(&self, jql: &str) -> Result<Vec<Issue>> {
        self.inner.search(&scope_jql(&self.project, jql)).await
    }

    async fn create(&self, issue: &NewIssue) -> Result<IssueHandle> {
        if issue.project == self.project {
            return self.inner.create(issue).await;
        }
        let mut scoped = issue.clone();
        scoped.project = self.project.clone();
        self.inner.create(&scoped).await
    }

    async fn update(&self, key: &str, update: &IssueUpdate) -> Result<()> {
        self.inner.update(key, update).await
    }

    async fn add_label(&self, key: &str, label: &str) -> Result<()> {
        self.inner.add_label(key, label).await
    }

    async fn add_link(&self, key: &str, link: &RemoteLink) -> Result<()> {
        self.inner.add_link(key, link).await
    }
}

/// Restrict a JQL query to one project, keeping any ORDER BY clause last
pub fn scope_jql(project: &str, jql: &str) -> String {
    let project_clause = format!("project = \"{}\"", sanitize_jql_term(project));

    let (condition, ordering) = match find_order_by(jql) {
        Some(pos) => (jql[..pos].trim(), Some(jql[pos..].trim())),
        None => (jql.trim(), None),
    };

    let mut scoped = if condition.is_empty() {
        project_clause
    } else {
        format!("{} AND ({})", project_clause, condition)
    };
    if let Some(ordering) = ordering {
        scoped.push(' ');
        scoped.push_str(ordering);
    }
    scoped
}

/// Byte offset of the last `ORDER BY` keyword outside quoted strings
fn find_order_by(jql: &str) -> Option<usize> {
    let lower = jql.to_ascii_lowercase();
    let mut found = None;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut previous: Option<char> = None;

    for (pos, c) in lower.char_indices() {
        if in_quotes {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quotes = false,
                _ => {}
            }
        } else if c == '"' {
            in_quotes = true;
        } else if lower[pos..].starts_with("order by")
            && !previous.is_some_and(|p| p.is_alphanumeric() || p == '_')
        {
            found = Some(pos);
        }
        previous = Some(c);
    }
    found
}

/// Strip everything but alphanumerics, `-` and `_` so a value can be embedded
/// in JQL without escaping
pub fn sanitize_jql_term(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// JQL reference for a field id: `customfield_10035` becomes `cf[10035]`,
/// other names are quoted
pub fn jql_field_ref(field: &str) -> String {
    match field.strip_prefix("customfield_") {
        Some(number) if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) => {
            format!("cf[{}]", number)
        }
        _ => format!("\"{}\"", field.replace('"', "")),
    }
}
