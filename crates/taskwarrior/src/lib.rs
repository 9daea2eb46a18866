//! Taskwarrior (task) wrapper for Rust
//!
//! A typed interface to the `task` CLI for reading tasks through `task export`.
//!
//! # Example
//!
//! ```no_run
//! use taskwarrior::TaskWarrior;
//!
//! let tw = TaskWarrior::new()?;
//!
//! // Pending tasks, in the order task reports them
//! for task in tw.pending()? {
//!     println!("{:?}: {}", task.id, task.description);
//! }
//! # Ok::<(), taskwarrior::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

/// rc overrides passed to every invocation so output is machine-readable
const DEFAULT_OVERRIDES: &[&str] = &[
    "rc.json.array=on",
    "rc.verbose=nothing",
    "rc.confirmation=off",
    "rc.hooks=off",
];

/// Errors that can occur when interacting with Taskwarrior
#[derive(Error, Debug)]
pub enum Error {
    #[error("task is not installed or not in PATH")]
    NotInstalled,

    #[error("Failed to execute task command: {0}")]
    CommandFailed(String),

    #[error("Failed to parse output: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for taskwarrior operations
pub type Result<T> = std::result::Result<T, Error>;

/// A task as produced by `task export`
///
/// `id`, `uuid`, `description` and `tags` are typed; every other attribute
/// (status, project, UDAs such as `gitlabtitle` or `redmineurl`, ...) lands in
/// `fields`, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Working-set id; `0` for tasks outside the working set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Task {
    /// Create a task with an id and description and nothing else
    pub fn new(id: u64, description: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set an arbitrary attribute (project, UDA, ...)
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Working-set id, ignoring the `0` that task exports for completed tasks
    pub fn working_id(&self) -> Option<u64> {
        self.id.filter(|id| *id != 0)
    }

    /// Text value of an attribute, typed or not
    ///
    /// Returns `None` when the attribute is absent or is not a scalar.
    pub fn text(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.map(|id| id.to_string()),
            "uuid" => self.uuid.clone(),
            "description" => Some(self.description.clone()),
            "tags" => (!self.tags.is_empty()).then(|| self.tags.join(",")),
            _ => match self.fields.get(name)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            },
        }
    }

    /// Every attribute of the record as `(name, rendered value)`
    ///
    /// Order: id, uuid, description, tags, then remaining attributes by name.
    /// Absent typed attributes are left out.
    pub fn record(&self) -> Vec<(String, String)> {
        let mut record = Vec::with_capacity(self.fields.len() + 4);
        if let Some(id) = self.id {
            record.push(("id".to_string(), id.to_string()));
        }
        if let Some(ref uuid) = self.uuid {
            record.push(("uuid".to_string(), uuid.clone()));
        }
        record.push(("description".to_string(), self.description.clone()));
        if !self.tags.is_empty() {
            record.push(("tags".to_string(), self.tags.join(", ")));
        }
        for (name, value) in &self.fields {
            record.push((name.clone(), render_value(value)));
        }
        record
    }
}

/// Render an exported attribute value for humans
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Parse `task export` output
///
/// Accepts a JSON array (`rc.json.array=on`) or the older one-object-per-line
/// format. Empty output means no tasks.
pub fn parse_export(output: &str) -> Result<Vec<Task>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(Error::from);
    }

    trimmed
        .lines()
        .map(|line| line.trim().trim_end_matches(','))
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| Error::ParseError(format!("{}: {}", e, line)))
        })
        .collect()
}

/// Taskwarrior CLI wrapper
#[derive(Debug, Clone)]
pub struct TaskWarrior {
    /// Executable to run (default: `task`)
    binary: PathBuf,
    /// Alternate taskrc file (TASKRC)
    taskrc: Option<PathBuf>,
    /// Alternate data directory (TASKDATA)
    data_location: Option<PathBuf>,
}

impl Default for TaskWarrior {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("task"),
            taskrc: None,
            data_location: None,
        }
    }
}

impl TaskWarrior {
    /// Create a new instance, checking that `task` can be run
    pub fn new() -> Result<Self> {
        let tw = Self::default();
        if !tw.is_available() {
            return Err(Error::NotInstalled);
        }
        Ok(tw)
    }

    /// Use a specific executable instead of `task` from PATH
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Read configuration from an alternate taskrc
    pub fn with_taskrc(mut self, path: impl Into<PathBuf>) -> Self {
        self.taskrc = Some(path.into());
        self
    }

    /// Read tasks from an alternate data directory
    pub fn with_data_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_location = Some(path.into());
        self
    }

    /// Check if task is available
    pub fn is_available(&self) -> bool {
        self.run_command(&["--version"]).is_ok()
    }

    // --- Export operations ---

    /// Export tasks matching a filter (e.g. `["status:pending", "project:work"]`)
    pub fn export(&self, filter: &[&str]) -> Result<Vec<Task>> {
        let mut args: Vec<&str> = filter.to_vec();
        args.push("export");

        let stdout = self.run_command(&args)?;
        parse_export(&stdout)
    }

    /// All pending tasks
    pub fn pending(&self) -> Result<Vec<Task>> {
        self.export(&["status:pending"])
    }

    // --- Private helpers ---

    /// Run a task command, returning stdout
    fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);

        // rc overrides must precede the filter and command
        for value in DEFAULT_OVERRIDES {
            cmd.arg(value);
        }

        cmd.args(args);

        if let Some(ref taskrc) = self.taskrc {
            cmd.env("TASKRC", taskrc);
        }
        if let Some(ref data) = self.data_location {
            cmd.env("TASKDATA", data);
        }

        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotInstalled
            } else {
                Error::Io(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!("task exited with {}", output.status)
            } else {
                stderr.trim().to_string()
            };
            return Err(Error::CommandFailed(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
