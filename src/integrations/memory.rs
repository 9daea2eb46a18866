//! In-memory issue tracker for sync tests.
//!
//! Understands the subset of JQL the sync engine produces: `=` and `~`
//! comparisons combined with `AND`/`OR`/parentheses, with any `ORDER BY`
//! ignored. Every call is recorded so tests can assert on traffic.

use super::tracker::{
    Issue, IssueHandle, IssueSnapshot, IssueTracker, IssueUpdate, NamedRef, NewIssue, RemoteLink,
};
use crate::{Result, TjsError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A call received by [`InMemoryTracker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    Search(String),
    Create(String),
    Update(String),
    AddLabel(String, String),
    AddLink(String, String),
}

impl TrackerCall {
    /// Whether the call changes remote state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, TrackerCall::Search(_))
    }
}

/// Issue held by [`InMemoryTracker`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredIssue {
    pub key: String,
    pub id: String,
    pub project: String,
    pub summary: String,
    pub description: String,
    pub labels: Vec<String>,
    pub issue_type: String,
    pub original_estimate: Option<String>,
    pub custom_fields: BTreeMap<String, Value>,
    pub links: Vec<RemoteLink>,
}

impl StoredIssue {
    /// Issue to seed into a tracker; key and id are assigned on insert
    pub fn new(project: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            summary: summary.into(),
            issue_type: "Task".to_string(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_custom_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_fields.insert(field.into(), value.into());
        self
    }

    pub fn handle(&self) -> IssueHandle {
        IssueHandle::new(&self.key, &self.id)
    }

    fn to_issue(&self) -> Issue {
        let mut other: BTreeMap<String, Value> = self.custom_fields.clone();
        other.insert(
            "project".to_string(),
            serde_json::json!({ "key": self.project }),
        );
        Issue {
            key: self.key.clone(),
            id: self.id.clone(),
            fields: IssueSnapshot {
                summary: self.summary.clone(),
                description: Some(self.description.clone()),
                labels: self.labels.clone(),
                issue_type: Some(NamedRef {
                    name: self.issue_type.clone(),
                    id: None,
                }),
                other,
            },
        }
    }

    /// Text values a JQL field reference resolves to
    fn values_for(&self, field: &str) -> Vec<String> {
        match field.to_ascii_lowercase().as_str() {
            "project" => vec![self.project.clone()],
            "key" | "issuekey" => vec![self.key.clone()],
            "summary" => vec![self.summary.clone()],
            "description" => vec![self.description.clone()],
            "labels" => self.labels.clone(),
            "issuetype" | "type" => vec![self.issue_type.clone()],
            _ => {
                let field_id = match field.strip_prefix("cf[").and_then(|f| f.strip_suffix(']')) {
                    Some(number) => format!("customfield_{}", number),
                    None => field.to_string(),
                };
                match self.custom_fields.get(&field_id) {
                    Some(Value::String(s)) => vec![s.clone()],
                    Some(Value::Null) | None => Vec::new(),
                    Some(other) => vec![other.to_string()],
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    issues: Vec<StoredIssue>,
    next_id: u64,
    calls: Vec<TrackerCall>,
    pending_failure: Option<String>,
    link_failure: Option<String>,
}

/// Thread-safe in-memory issue tracker
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    state: Mutex<TrackerState>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        // a panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an existing issue, assigning it the next key in its project
    pub fn insert(&self, mut issue: StoredIssue) -> IssueHandle {
        let mut state = self.lock();
        state.next_id += 1;
        issue.key = format!("{}-{}", issue.project, state.next_id);
        issue.id = (10000 + state.next_id).to_string();
        let handle = issue.handle();
        state.issues.push(issue);
        handle
    }

    /// Make the next call fail with an integration error
    pub fn fail_next_call(&self, message: impl Into<String>) {
        self.lock().pending_failure = Some(message.into());
    }

    /// Make every `add_link` call fail with an integration error
    pub fn fail_link_calls(&self, message: impl Into<String>) {
        self.lock().link_failure = Some(message.into());
    }

    /// Snapshot of an issue by key
    pub fn issue(&self, key: &str) -> Option<StoredIssue> {
        self.lock().issues.iter().find(|i| i.key == key).cloned()
    }

    /// Snapshot of all issues, in creation order
    pub fn issues(&self) -> Vec<StoredIssue> {
        self.lock().issues.clone()
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<TrackerCall> {
        self.lock().calls.clone()
    }

    /// Calls that changed state
    pub fn mutations(&self) -> Vec<TrackerCall> {
        self.calls().into_iter().filter(TrackerCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Record a call, failing it if a failure was queued
    fn record(&self, state: &mut TrackerState, call: TrackerCall) -> Result<()> {
        let is_link = matches!(call, TrackerCall::AddLink(..));
        state.calls.push(call);
        if let Some(message) = state.pending_failure.take() {
            return Err(TjsError::Integration(message));
        }
        match state.link_failure {
            Some(ref message) if is_link => Err(TjsError::Integration(message.clone())),
            _ => Ok(()),
        }
    }

    fn with_issue<F>(&self, key: &str, call: TrackerCall, apply: F) -> Result<()>
    where
        F: FnOnce(&mut StoredIssue),
    {
        let mut state = self.lock();
        self.record(&mut state, call)?;
        let issue = state
            .issues
            .iter_mut()
            .find(|i| i.key == key)
            .ok_or_else(|| TjsError::IssueNotFound(key.to_string()))?;
        apply(issue);
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for InMemoryTracker {
    async fn search(&self, jql: &str) -> Result<Vec<Issue>> {
        let mut state = self.lock();
        self.record(&mut state, TrackerCall::Search(jql.to_string()))?;

        let query = Query::parse(jql)?;
        Ok(state
            .issues
            .iter()
            .filter(|issue| query.matches(issue))
            .map(StoredIssue::to_issue)
            .collect())
    }

    async fn create(&self, issue: &NewIssue) -> Result<IssueHandle> {
        let mut state = self.lock();
        state.next_id += 1;
        let key = format!("{}-{}", issue.project, state.next_id);
        self.record(&mut state, TrackerCall::Create(key.clone()))?;

        let stored = StoredIssue {
            key,
            id: (10000 + state.next_id).to_string(),
            project: issue.project.clone(),
            summary: issue.fields.summary.clone(),
            description: issue.fields.description.clone(),
            labels: issue.fields.labels.clone(),
            issue_type: issue.fields.issue_type.clone(),
            original_estimate: issue.fields.original_estimate.clone(),
            custom_fields: issue.custom_fields.clone(),
            links: Vec::new(),
        };
        let handle = stored.handle();
        state.issues.push(stored);
        Ok(handle)
    }

    async fn update(&self, key: &str, update: &IssueUpdate) -> Result<()> {
        self.with_issue(key, TrackerCall::Update(key.to_string()), |issue| {
            if let Some(ref summary) = update.summary {
                issue.summary = summary.clone();
            }
            if let Some(ref description) = update.description {
                issue.description = description.clone();
            }
            if let Some(ref issue_type) = update.issue_type {
                issue.issue_type = issue_type.clone();
            }
            if let Some(ref estimate) = update.original_estimate {
                issue.original_estimate = Some(estimate.clone());
            }
            if let Some(ref labels) = update.labels {
                issue.labels = labels.clone();
            }
        })
    }

    async fn add_label(&self, key: &str, label: &str) -> Result<()> {
        let call = TrackerCall::AddLabel(key.to_string(), label.to_string());
        self.with_issue(key, call, |issue| issue.labels.push(label.to_string()))
    }

    async fn add_link(&self, key: &str, link: &RemoteLink) -> Result<()> {
        let call = TrackerCall::AddLink(key.to_string(), link.url.clone());
        self.with_issue(key, call, |issue| issue.links.push(link.clone()))
    }
}

// ============ JQL subset ============

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Open,
    Close,
    Equals,
    Contains,
}

#[derive(Debug)]
enum Query {
    All,
    Equals(String, String),
    Contains(String, String),
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
}

impl Query {
    fn parse(jql: &str) -> Result<Self> {
        let tokens = tokenize(jql)?;
        // ORDER BY does not affect matching
        let end = tokens
            .windows(2)
            .position(|w| is_keyword(&w[0], "order") && is_keyword(&w[1], "by"))
            .unwrap_or(tokens.len());
        let tokens = &tokens[..end];
        if tokens.is_empty() {
            return Ok(Query::All);
        }

        let mut parser = Parser { tokens, pos: 0 };
        let query = parser.or_expr()?;
        if parser.pos != tokens.len() {
            return Err(unsupported(jql));
        }
        Ok(query)
    }

    fn matches(&self, issue: &StoredIssue) -> bool {
        match self {
            Query::All => true,
            Query::Equals(field, value) => issue.values_for(field).iter().any(|v| v == value),
            Query::Contains(field, text) => {
                let needle = text.to_lowercase();
                issue
                    .values_for(field)
                    .iter()
                    .any(|v| contains_phrase(&v.to_lowercase(), &needle))
            }
            Query::And(a, b) => a.matches(issue) && b.matches(issue),
            Query::Or(a, b) => a.matches(issue) || b.matches(issue),
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or_expr(&mut self) -> Result<Query> {
        let mut left = self.and_expr()?;
        while self.peek().is_some_and(|t| is_keyword(t, "or")) {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Query::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Query> {
        let mut left = self.term()?;
        while self.peek().is_some_and(|t| is_keyword(t, "and")) {
            self.pos += 1;
            let right = self.term()?;
            left = Query::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Query> {
        match self.next() {
            Some(Token::Open) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(TjsError::Integration("JQL: missing ')'".to_string())),
                }
            }
            Some(Token::Word(field)) | Some(Token::Quoted(field)) => {
                let op = self.next();
                let value = match self.next() {
                    Some(Token::Word(v)) | Some(Token::Quoted(v)) => v,
                    other => {
                        return Err(TjsError::Integration(format!(
                            "JQL: expected value after {}, got {:?}",
                            field, other
                        )))
                    }
                };
                match op {
                    Some(Token::Equals) => Ok(Query::Equals(field, value)),
                    Some(Token::Contains) => Ok(Query::Contains(field, unquote_phrase(&value))),
                    other => Err(TjsError::Integration(format!(
                        "JQL: unsupported operator {:?}",
                        other
                    ))),
                }
            }
            other => Err(TjsError::Integration(format!(
                "JQL: unexpected token {:?}",
                other
            ))),
        }
    }
}

fn is_keyword(token: &Token, keyword: &str) -> bool {
    matches!(token, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
}

/// `~ "\"exact phrase\""` searches for the phrase itself
fn unquote_phrase(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// Phrase match on word boundaries, like JIRA's text search
///
/// `taskwarrior:4` does not match inside `taskwarrior:42`.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn unsupported(jql: &str) -> TjsError {
    TjsError::Integration(format!("JQL not supported by in-memory tracker: {}", jql))
}

fn tokenize(jql: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = jql.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Equals);
            }
            '~' => {
                chars.next();
                tokens.push(Token::Contains);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                text.push(escaped);
                            }
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => text.push(other),
                    }
                }
                if !closed {
                    return Err(unsupported(jql));
                }
                tokens.push(Token::Quoted(text));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '=' | '~' | '"') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> InMemoryTracker {
        let tracker = InMemoryTracker::new();
        tracker.insert(
            StoredIssue::new("VS", "First")
                .with_custom_field("customfield_10035", 7)
                .with_description("id: 7"),
        );
        tracker.insert(
            StoredIssue::new("VS", "Legacy").with_description("imported\nTaskWarrior:9\n"),
        );
        tracker.insert(StoredIssue::new("OPS", "Other project").with_custom_field("customfield_10035", 7));
        tracker
    }

    #[tokio::test]
    async fn test_search_by_custom_field() {
        let tracker = seeded();
        let found = tracker
            .search("project = \"VS\" AND (cf[10035] = 7)")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].fields.summary, "First");
    }

    #[tokio::test]
    async fn test_search_by_description_phrase() {
        let tracker = seeded();
        let found = tracker
            .search(r#"project = "VS" AND (cf[10035] = 9 OR description ~ "\"TaskWarrior:9\"")"#)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].fields.summary, "Legacy");
    }

    #[test]
    fn test_contains_phrase_word_boundaries() {
        assert!(contains_phrase("imported\ntaskwarrior:9\n", "taskwarrior:9"));
        assert!(contains_phrase("taskwarrior:9", "taskwarrior:9"));
        assert!(!contains_phrase("taskwarrior:92", "taskwarrior:9"));
        assert!(!contains_phrase("xtaskwarrior:9", "taskwarrior:9"));
        assert!(contains_phrase("taskwarrior:92 taskwarrior:9.", "taskwarrior:9"));
    }

    #[tokio::test]
    async fn test_search_phrase_not_matched_inside_longer_identifier() {
        let tracker = seeded();
        let found = tracker
            .search(r#"project = "VS" AND (description ~ "\"TaskWarrior:90\"")"#)
            .await
            .unwrap();
        assert!(found.is_empty());
        let found = tracker
            .search(r#"project = "VS" AND (description ~ "\"TaskWarrior:\"")"#)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_search_order_by_ignored() {
        let tracker = seeded();
        let found = tracker
            .search("project = \"VS\" ORDER BY created DESC")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_search_unsupported_jql() {
        let tracker = seeded();
        assert!(tracker.search("project in (A, B)").await.is_err());
    }

    #[tokio::test]
    async fn test_create_update_label_link() {
        let tracker = InMemoryTracker::new();
        let fields = crate::integrations::IssueFields {
            summary: "New".to_string(),
            description: "id: 1".to_string(),
            labels: vec!["a".to_string()],
            issue_type: "Task".to_string(),
            original_estimate: None,
            links: vec![],
        };
        let handle = tracker
            .create(&NewIssue::new("VS", fields).with_custom_field("customfield_10035", 1))
            .await
            .unwrap();
        assert_eq!(handle.key, "VS-1");

        let update = IssueUpdate {
            summary: Some("Renamed".to_string()),
            labels: Some(Vec::new()),
            ..Default::default()
        };
        tracker.update(&handle.key, &update).await.unwrap();
        tracker.add_label(&handle.key, "b").await.unwrap();
        tracker
            .add_link(&handle.key, &RemoteLink::new("https://x", "X"))
            .await
            .unwrap();

        let stored = tracker.issue("VS-1").unwrap();
        assert_eq!(stored.summary, "Renamed");
        assert_eq!(stored.labels, vec!["b"]);
        assert_eq!(stored.links.len(), 1);
        assert_eq!(tracker.mutations().len(), 4);
    }

    #[tokio::test]
    async fn test_update_missing_issue() {
        let tracker = InMemoryTracker::new();
        let result = tracker.add_label("VS-404", "x").await;
        assert!(matches!(result, Err(TjsError::IssueNotFound(_))));
    }

    #[tokio::test]
    async fn test_fail_next_call() {
        let tracker = seeded();
        tracker.fail_next_call("boom");
        assert!(tracker.search("project = VS").await.is_err());
        assert!(tracker.search("project = VS").await.is_ok());
    }
}
