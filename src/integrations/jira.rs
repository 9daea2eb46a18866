//! JIRA Integration Adapter
//!
//! One-way push of tasks into JIRA using REST API v2 (plain-text
//! descriptions). Implements [`IssueTracker`] so the sync engine never sees
//! HTTP details.

use super::tracker::{Issue, IssueHandle, IssueTracker, IssueUpdate, NewIssue, RemoteLink};
use crate::auth::{Credential, CredentialProvider};
use crate::{Result, TjsError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for search/query operations (large result sets)
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request timeout for create/update operations
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);
/// Page size requested from the search endpoint
const PAGE_SIZE: u32 = 100;

/// JIRA REST client
pub struct JiraClient {
    client: Client,
    base_url: String,
    credential: Credential,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchPage {
    #[serde(default)]
    total: u32,
    #[serde(rename = "startAt", default)]
    start_at: u32,
    #[serde(default)]
    issues: Vec<Issue>,
}

#[derive(Debug, Clone, Deserialize)]
struct CreatedIssue {
    id: String,
    key: String,
}

impl JiraClient {
    /// Create a new JIRA client for the instance at `url`
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(url: &str, credential: Credential) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("tjs/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = format!("{}/rest/api/2", url.trim_end_matches('/'));

        Ok(Self {
            client,
            base_url,
            credential,
        })
    }

    /// Create a client, fetching the credential from `provider` once
    pub fn from_provider(url: &str, provider: &dyn CredentialProvider) -> Result<Self> {
        let credential = provider.credential()?;
        Self::new(url, credential)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.credential {
            Credential::Basic {
                ref user,
                ref token,
            } => request.basic_auth(user, Some(token)),
            Credential::Bearer(ref token) => request.bearer_auth(token),
        }
    }

    async fn search_page(&self, jql: &str, start_at: u32) -> Result<SearchPage> {
        let url = format!("{}/search", self.base_url);

        let params = [
            ("jql", jql.to_string()),
            ("startAt", start_at.to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
            ("fields", "*all".to_string()),
        ];

        let request = self.authorize(self.client.get(&url).query(&params));
        let response = request.timeout(SEARCH_TIMEOUT).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            _ => Err(error_for_response(response, jql).await),
        }
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn search(&self, jql: &str) -> Result<Vec<Issue>> {
        debug!(jql = %jql, "Searching JIRA issues");

        let mut issues = Vec::new();
        loop {
            let page = self.search_page(jql, issues.len() as u32).await?;
            let returned = page.issues.len();
            let total = page.total;
            debug!(start_at = page.start_at, returned, total, "JIRA search page");

            issues.extend(page.issues);
            if returned == 0 || issues.len() as u32 >= total {
                break;
            }
        }

        info!(total = issues.len(), "JIRA search complete");
        Ok(issues)
    }

    async fn create(&self, issue: &NewIssue) -> Result<IssueHandle> {
        let url = format!("{}/issue", self.base_url);
        let body = create_body(issue);

        info!(project = %issue.project, summary = %issue.fields.summary, "Creating JIRA issue");

        let request = self.authorize(self.client.post(&url).json(&body));
        let response = request.timeout(WRITE_TIMEOUT).send().await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                let created: CreatedIssue = response.json().await?;
                info!(key = %created.key, "Created JIRA issue");
                Ok(IssueHandle::new(created.key, created.id))
            }
            _ => Err(error_for_response(response, &issue.project).await),
        }
    }

    async fn update(&self, key: &str, update: &IssueUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let url = format!("{}/issue/{}", self.base_url, key);
        info!(key = %key, "Updating JIRA issue");

        let request = self.authorize(self.client.put(&url).json(&update_body(update)));
        let response = request.timeout(WRITE_TIMEOUT).send().await?;
        expect_no_content(response, key).await
    }

    async fn add_label(&self, key: &str, label: &str) -> Result<()> {
        let url = format!("{}/issue/{}", self.base_url, key);
        let body = json!({
            "update": {
                "labels": [
                    { "add": jira_label(label) }
                ]
            }
        });

        debug!(key = %key, label = %label, "Adding label to JIRA issue");

        let request = self.authorize(self.client.put(&url).json(&body));
        let response = request.timeout(WRITE_TIMEOUT).send().await?;
        expect_no_content(response, key).await
    }

    async fn add_link(&self, key: &str, link: &RemoteLink) -> Result<()> {
        let url = format!("{}/issue/{}/remotelink", self.base_url, key);
        let body = json!({
            "object": {
                "url": link.url,
                "title": link.title,
            }
        });

        debug!(key = %key, url = %link.url, "Adding remote link to JIRA issue");

        let request = self.authorize(self.client.post(&url).json(&body));
        let response = request.timeout(WRITE_TIMEOUT).send().await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            _ => Err(error_for_response(response, key).await),
        }
    }
}

async fn expect_no_content(response: Response, key: &str) -> Result<()> {
    match response.status() {
        StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
        _ => Err(error_for_response(response, key).await),
    }
}

/// Turn a non-success response into an error
///
/// `subject` names what the request was about (issue key, project, JQL).
async fn error_for_response(response: Response, subject: &str) -> TjsError {
    match response.status() {
        StatusCode::UNAUTHORIZED => TjsError::Auth("JIRA authentication failed".to_string()),
        StatusCode::NOT_FOUND => TjsError::IssueNotFound(subject.to_string()),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            TjsError::RateLimited(retry_after)
        }
        status => {
            let error_body = response.text().await.unwrap_or_default();
            TjsError::Integration(format!("JIRA API error: HTTP {}: {}", status, error_body))
        }
    }
}

/// JIRA rejects whitespace inside labels
pub fn jira_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Body for `POST /issue`
pub fn create_body(issue: &NewIssue) -> Value {
    let mut fields = Map::new();
    fields.insert("project".to_string(), json!({ "key": issue.project }));
    fields.insert("summary".to_string(), json!(issue.fields.summary));
    fields.insert("description".to_string(), json!(issue.fields.description));
    fields.insert("issuetype".to_string(), json!({ "name": issue.fields.issue_type }));
    fields.insert(
        "labels".to_string(),
        json!(issue
            .fields
            .labels
            .iter()
            .map(|l| jira_label(l))
            .collect::<Vec<_>>()),
    );
    if let Some(ref estimate) = issue.fields.original_estimate {
        fields.insert(
            "timetracking".to_string(),
            json!({ "originalEstimate": estimate }),
        );
    }
    for (field, value) in &issue.custom_fields {
        fields.insert(field.clone(), value.clone());
    }

    json!({ "fields": fields })
}

/// Body for `PUT /issue/{key}` carrying only the fields being set
pub fn update_body(update: &IssueUpdate) -> Value {
    let mut fields = Map::new();
    if let Some(ref summary) = update.summary {
        fields.insert("summary".to_string(), json!(summary));
    }
    if let Some(ref description) = update.description {
        fields.insert("description".to_string(), json!(description));
    }
    if let Some(ref issue_type) = update.issue_type {
        fields.insert("issuetype".to_string(), json!({ "name": issue_type }));
    }
    if let Some(ref estimate) = update.original_estimate {
        fields.insert(
            "timetracking".to_string(),
            json!({ "originalEstimate": estimate }),
        );
    }
    if let Some(ref labels) = update.labels {
        fields.insert(
            "labels".to_string(),
            json!(labels.iter().map(|l| jira_label(l)).collect::<Vec<_>>()),
        );
    }

    json!({ "fields": fields })
}
