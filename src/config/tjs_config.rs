//! tjs configuration file handling
//!
//! Loads and manages the ~/.config/tjs/config.yaml file. Every section has
//! defaults, so a partial file (or none at all) is a valid starting point.

use crate::cache::MappingCache;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use taskwarrior::{Task, TaskWarrior};

/// Where the JIRA credential comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CredentialSettings {
    /// `pass <entry>`; basic auth when `user` is set, bearer otherwise
    Pass {
        entry: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },
    /// Token in an environment variable (`$` prefix allowed)
    Env {
        var: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },
}

impl Default for CredentialSettings {
    fn default() -> Self {
        CredentialSettings::Pass {
            entry: "jira".to_string(),
            user: None,
        }
    }
}

/// JIRA connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraSettings {
    /// Instance URL (e.g. https://example.atlassian.net)
    #[serde(default)]
    pub url: String,

    /// Project key all issues live in
    #[serde(default = "default_project")]
    pub project: String,

    /// Custom field holding the task identifier
    #[serde(default = "default_id_field")]
    pub id_field: String,

    #[serde(default)]
    pub credential: CredentialSettings,
}

fn default_project() -> String {
    "VS".to_string()
}

fn default_id_field() -> String {
    "customfield_10035".to_string()
}

impl Default for JiraSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            project: default_project(),
            id_field: default_id_field(),
            credential: CredentialSettings::default(),
        }
    }
}

/// Task attribute turned into a titled link on the issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkField {
    pub field: String,
    pub title: String,
}

/// Which task attributes feed which issue fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRules {
    /// First present one replaces the description as summary
    #[serde(default = "default_title_fields")]
    pub title_fields: Vec<String>,

    /// Appended to the task tags as labels, in order
    #[serde(default = "default_label_fields")]
    pub label_fields: Vec<String>,

    /// Overrides `default_issue_type` when present
    #[serde(default = "default_type_field")]
    pub type_field: String,

    #[serde(default = "default_issue_type")]
    pub default_issue_type: String,

    /// ISO-8601 duration attribute used as the original estimate
    #[serde(default = "default_estimate_field")]
    pub estimate_field: String,

    #[serde(default = "default_link_fields")]
    pub link_fields: Vec<LinkField>,
}

fn default_title_fields() -> Vec<String> {
    vec!["gitlabtitle".to_string(), "redminesubject".to_string()]
}

fn default_label_fields() -> Vec<String> {
    vec!["project".to_string(), "gitlabnamespace".to_string()]
}

fn default_type_field() -> String {
    "redminetracker".to_string()
}

fn default_issue_type() -> String {
    "Task".to_string()
}

fn default_estimate_field() -> String {
    "redmineestimatedhours".to_string()
}

fn default_link_fields() -> Vec<LinkField> {
    vec![LinkField {
        field: "redmineurl".to_string(),
        title: "Redmine".to_string(),
    }]
}

impl Default for MappingRules {
    fn default() -> Self {
        Self {
            title_fields: default_title_fields(),
            label_fields: default_label_fields(),
            type_field: default_type_field(),
            default_issue_type: default_issue_type(),
            estimate_field: default_estimate_field(),
            link_fields: default_link_fields(),
        }
    }
}

/// Task attribute identifying a task across passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// Working-set id; changes when tasks complete
    #[default]
    Id,
    /// Stable uuid
    Uuid,
}

impl IdentifierKind {
    /// Identifier of `task`, if it has one
    pub fn of(&self, task: &Task) -> Option<String> {
        match self {
            IdentifierKind::Id => task.working_id().map(|id| id.to_string()),
            IdentifierKind::Uuid => task.uuid.clone().filter(|u| !u.is_empty()),
        }
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierKind::Id => write!(f, "id"),
            IdentifierKind::Uuid => write!(f, "uuid"),
        }
    }
}

/// Sync engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub identifier: IdentifierKind,

    /// Seconds between passes in continuous mode
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Prefix of the identifier in descriptions of issues made by older tools
    #[serde(default = "default_legacy_marker")]
    pub legacy_marker: String,

    /// Clear labels before re-adding them on update
    #[serde(default = "default_true")]
    pub reset_labels_on_update: bool,

    /// Mapping cache file (default ~/.cache/tjs/mapping.json)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_legacy_marker() -> String {
    "TaskWarrior:".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            identifier: IdentifierKind::default(),
            poll_interval_secs: default_poll_interval(),
            legacy_marker: default_legacy_marker(),
            reset_labels_on_update: true,
            cache_path: None,
        }
    }
}

/// Taskwarrior invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskwarriorSettings {
    #[serde(default = "default_task_binary")]
    pub binary: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taskrc: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_location: Option<PathBuf>,
}

fn default_task_binary() -> PathBuf {
    PathBuf::from("task")
}

impl Default for TaskwarriorSettings {
    fn default() -> Self {
        Self {
            binary: default_task_binary(),
            taskrc: None,
            data_location: None,
        }
    }
}

impl TaskwarriorSettings {
    /// Taskwarrior wrapper configured from these settings
    pub fn task_warrior(&self) -> TaskWarrior {
        let mut tw = TaskWarrior::default().with_binary(&self.binary);
        if let Some(ref taskrc) = self.taskrc {
            tw = tw.with_taskrc(taskrc);
        }
        if let Some(ref data) = self.data_location {
            tw = tw.with_data_location(data);
        }
        tw
    }
}

/// tjs configuration
///
/// Represents the complete ~/.config/tjs/config.yaml file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TjsConfig {
    #[serde(default)]
    pub jira: JiraSettings,

    #[serde(default)]
    pub mapping: MappingRules,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub taskwarrior: TaskwarriorSettings,
}

impl TjsConfig {
    /// Create a configuration with every default
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.jira.url = url.into();
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.jira.project = project.into();
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sync.cache_path = Some(path.into());
        self
    }

    pub fn with_identifier(mut self, identifier: IdentifierKind) -> Self {
        self.sync.identifier = identifier;
        self
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::TjsError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading tjs configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            url = %config.jira.url,
            project = %config.jira.project,
            identifier = %config.sync.identifier,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving tjs configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/tjs/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("tjs");
        path.push("config.yaml");
        path
    }

    /// Effective mapping cache location
    pub fn cache_path(&self) -> PathBuf {
        self.sync
            .cache_path
            .clone()
            .unwrap_or_else(MappingCache::default_path)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync.poll_interval_secs)
    }
}
