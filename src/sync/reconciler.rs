//! Single reconciliation pass
//!
//! Each pending task goes through resolve → create / skip / update. Tasks
//! are processed one at a time in source order.

use super::mapper::FieldMapper;
use super::resolver::{IssueResolver, Resolution};
use crate::cache::MappingCache;
use crate::config::{IdentifierKind, TjsConfig};
use crate::integrations::{IssueFields, IssueHandle, IssueTracker, IssueUpdate, NewIssue};
use crate::source::TaskSource;
use crate::Result;
use chrono::{DateTime, Utc};
use taskwarrior::Task;
use tracing::{debug, info, warn};

/// Options for one pass
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Only process the task with this identifier
    pub task_filter: Option<String>,
    /// Overwrite issues that already exist; also bypasses the cache
    pub allow_update: bool,
}

impl PassOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_filter(mut self, identifier: impl Into<String>) -> Self {
        self.task_filter = Some(identifier.into());
        self
    }

    pub fn with_allow_update(mut self, allow_update: bool) -> Self {
        self.allow_update = allow_update;
        self
    }

    /// Cached mappings are trusted only when nothing will be overwritten
    pub fn use_cache(&self) -> bool {
        !self.allow_update
    }
}

/// What happened to a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Created { key: String },
    Skipped { key: String },
    Updated { key: String },
    Duplicate { keys: Vec<String> },
    Failed { reason: String },
}

impl SyncAction {
    pub fn label(&self) -> &'static str {
        match self {
            SyncAction::Created { .. } => "created",
            SyncAction::Skipped { .. } => "skipped",
            SyncAction::Updated { .. } => "updated",
            SyncAction::Duplicate { .. } => "duplicate",
            SyncAction::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncAction::Created { key } | SyncAction::Skipped { key } | SyncAction::Updated { key } => {
                write!(f, "{} {}", self.label(), key)
            }
            SyncAction::Duplicate { keys } => write!(f, "duplicate {}", keys.join(", ")),
            SyncAction::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Outcome for one task
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// `None` when the task had no identifier
    pub identifier: Option<String>,
    pub description: String,
    pub action: SyncAction,
    /// Fields sent to the tracker, when any were mapped
    pub fields: Option<IssueFields>,
}

/// Result of a pass
#[derive(Debug, Clone)]
pub struct PassReport {
    pub outcomes: Vec<TaskOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PassReport {
    fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.action.label() == label)
            .count()
    }

    pub fn created(&self) -> usize {
        self.count("created")
    }

    pub fn updated(&self) -> usize {
        self.count("updated")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn duplicates(&self) -> usize {
        self.count("duplicate")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Outcome for a task identifier
    pub fn outcome(&self, identifier: &str) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.identifier.as_deref() == Some(identifier))
    }

    /// Duplicate issues, per task identifier
    pub fn duplicate_keys(&self) -> Vec<(String, Vec<String>)> {
        self.outcomes
            .iter()
            .filter_map(|o| match (&o.identifier, &o.action) {
                (Some(id), SyncAction::Duplicate { keys }) => Some((id.clone(), keys.clone())),
                _ => None,
            })
            .collect()
    }
}

/// Drives passes over a task source against a tracker
pub struct Reconciler<S, T> {
    source: S,
    resolver: IssueResolver<T>,
    mapper: FieldMapper,
    identifier: IdentifierKind,
    id_field: String,
    project: String,
    reset_labels_on_update: bool,
}

impl<S: TaskSource, T: IssueTracker> Reconciler<S, T> {
    pub fn new(source: S, tracker: T, cache: MappingCache, config: &TjsConfig) -> Self {
        Self {
            source,
            resolver: IssueResolver::new(
                tracker,
                cache,
                &config.jira.id_field,
                &config.sync.legacy_marker,
            ),
            mapper: FieldMapper::new(config.mapping.clone()),
            identifier: config.sync.identifier,
            id_field: config.jira.id_field.clone(),
            project: config.jira.project.clone(),
            reset_labels_on_update: config.sync.reset_labels_on_update,
        }
    }

    pub fn resolver(&self) -> &IssueResolver<T> {
        &self.resolver
    }

    pub fn cache_mut(&mut self) -> &mut MappingCache {
        self.resolver.cache_mut()
    }

    /// Run one pass over the pending tasks
    ///
    /// Task-scoped failures (bad estimate, missing identifier) are recorded
    /// and the pass continues. Tracker and task source errors abort it.
    pub async fn run_pass(&mut self, options: &PassOptions) -> Result<PassReport> {
        let started_at = Utc::now();
        let tasks = self.source.load_pending_tasks().await?;

        let tasks: Vec<Task> = match options.task_filter {
            Some(ref wanted) => {
                let selected: Vec<Task> = tasks
                    .into_iter()
                    .filter(|t| self.identifier.of(t).as_deref() == Some(wanted.as_str()))
                    .collect();
                if selected.is_empty() {
                    warn!(task = %wanted, "No pending task with this identifier");
                }
                selected
            }
            None => tasks,
        };

        info!(
            tasks = tasks.len(),
            allow_update = options.allow_update,
            "Starting sync pass"
        );

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let outcome = self.process_task(task, options).await?;
            info!(
                task = outcome.identifier.as_deref().unwrap_or("-"),
                action = %outcome.action,
                "Task processed"
            );
            outcomes.push(outcome);
        }

        let report = PassReport {
            outcomes,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            created = report.created(),
            updated = report.updated(),
            skipped = report.skipped(),
            duplicates = report.duplicates(),
            failed = report.failed(),
            "Sync pass complete"
        );
        Ok(report)
    }

    async fn process_task(&mut self, task: &Task, options: &PassOptions) -> Result<TaskOutcome> {
        let Some(identifier) = self.identifier.of(task) else {
            warn!(description = %task.description, kind = %self.identifier, "Task has no identifier");
            return Ok(TaskOutcome {
                identifier: None,
                description: task.description.clone(),
                action: SyncAction::Failed {
                    reason: format!("task has no {}", self.identifier),
                },
                fields: None,
            });
        };

        let mut outcome = TaskOutcome {
            identifier: Some(identifier.clone()),
            description: task.description.clone(),
            action: SyncAction::Failed {
                reason: String::new(),
            },
            fields: None,
        };

        let resolution = self.resolver.resolve(&identifier, options.use_cache()).await?;
        let result = match resolution {
            Resolution::Duplicate(keys) => Ok(SyncAction::Duplicate { keys }),
            Resolution::Found(handle) if !options.allow_update => {
                debug!(task = %identifier, issue = %handle.key, "Issue exists, not updating");
                Ok(SyncAction::Skipped { key: handle.key })
            }
            Resolution::Found(handle) => self.update(task, &handle, &mut outcome).await,
            Resolution::NotFound => self.create(task, &identifier, &mut outcome).await,
        };

        outcome.action = match result {
            Ok(action) => action,
            Err(e) if e.is_task_scoped() => {
                warn!(task = %identifier, error = %e, "Skipping task");
                SyncAction::Failed {
                    reason: e.to_string(),
                }
            }
            Err(e) => return Err(e),
        };
        Ok(outcome)
    }

    async fn create(
        &mut self,
        task: &Task,
        identifier: &str,
        outcome: &mut TaskOutcome,
    ) -> Result<SyncAction> {
        let fields = self.mapper.map_fields(task)?;
        outcome.fields = Some(fields.clone());

        let request = NewIssue::new(&self.project, fields)
            .with_custom_field(&self.id_field, FieldMapper::identifier_value(identifier));
        let tracker = self.resolver.tracker();
        let handle = tracker.create(&request).await?;
        // cached before links so a failed link cannot lead to a second create
        self.resolver.remember(identifier, handle.clone());

        let tracker = self.resolver.tracker();
        for link in &request.fields.links {
            tracker.add_link(&handle.key, link).await?;
        }

        Ok(SyncAction::Created { key: handle.key })
    }

    async fn update(
        &mut self,
        task: &Task,
        handle: &IssueHandle,
        outcome: &mut TaskOutcome,
    ) -> Result<SyncAction> {
        let fields = self.mapper.map_fields(task)?;
        outcome.fields = Some(fields.clone());

        let mut update = IssueUpdate::from_fields(&fields);
        if self.reset_labels_on_update {
            update = update.with_labels(Vec::new());
        }

        let tracker = self.resolver.tracker();
        tracker.update(&handle.key, &update).await?;
        for label in &fields.labels {
            tracker.add_label(&handle.key, label).await?;
        }
        for link in &fields.links {
            tracker.add_link(&handle.key, link).await?;
        }

        Ok(SyncAction::Updated {
            key: handle.key.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::{InMemoryTracker, ScopedTracker, StoredIssue, TrackerCall};
    use crate::TjsError;
    use std::sync::Arc;

    const ID_FIELD: &str = "customfield_10035";

    type TestReconciler = Reconciler<Vec<Task>, ScopedTracker<Arc<InMemoryTracker>>>;

    fn reconciler(tasks: Vec<Task>, tracker: &Arc<InMemoryTracker>) -> TestReconciler {
        let config = TjsConfig::new().with_url("https://jira.example.com");
        Reconciler::new(
            tasks,
            ScopedTracker::new(Arc::clone(tracker), "VS"),
            MappingCache::in_memory(),
            &config,
        )
    }

    #[tokio::test]
    async fn test_creates_missing_issue() {
        let tracker = Arc::new(InMemoryTracker::new());
        let task = Task::new(7, "Write docs")
            .with_tag("docs")
            .with_field("redmineurl", "https://redmine.example.com/issues/7")
            .with_field("redmineestimatedhours", "PT2H");
        let mut reconciler = reconciler(vec![task], &tracker);

        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();

        assert_eq!(report.created(), 1);
        let key = match report.outcomes[0].action {
            SyncAction::Created { ref key } => key.clone(),
            ref other => panic!("unexpected action {:?}", other),
        };
        let stored = tracker.issue(&key).unwrap();
        assert_eq!(stored.project, "VS");
        assert_eq!(stored.summary, "Write docs");
        assert_eq!(stored.custom_fields[ID_FIELD], 7);
        assert_eq!(stored.original_estimate.as_deref(), Some("120m"));
        assert_eq!(stored.links.len(), 1);
        assert_eq!(reconciler.resolver().cache().get("7").unwrap().key, key);
    }

    #[tokio::test]
    async fn test_second_pass_skips_from_cache() {
        let tracker = Arc::new(InMemoryTracker::new());
        let mut reconciler = reconciler(vec![Task::new(1, "a")], &tracker);

        reconciler.run_pass(&PassOptions::new()).await.unwrap();
        tracker.clear_calls();

        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();
        assert_eq!(report.skipped(), 1);
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_existing_issue_skipped_without_update() {
        let tracker = Arc::new(InMemoryTracker::new());
        let handle = tracker.insert(StoredIssue::new("VS", "old").with_custom_field(ID_FIELD, 3));
        let task = Task::new(3, "new").with_tag("x");
        let mut reconciler = reconciler(vec![task], &tracker);

        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();

        assert_eq!(
            report.outcomes[0].action,
            SyncAction::Skipped { key: handle.key.clone() }
        );
        assert!(report.outcomes[0].fields.is_none());
        assert!(tracker.mutations().is_empty());
        assert_eq!(tracker.issue(&handle.key).unwrap().summary, "old");
    }

    #[tokio::test]
    async fn test_update_overwrites_and_readds_labels() {
        let tracker = Arc::new(InMemoryTracker::new());
        let handle = tracker.insert(StoredIssue::new("VS", "old").with_custom_field(ID_FIELD, 3));
        let task = Task::new(3, "new")
            .with_tag("x")
            .with_field("project", "home")
            .with_field("redmineurl", "https://redmine.example.com/issues/3");
        let mut reconciler = reconciler(vec![task], &tracker);

        let report = reconciler
            .run_pass(&PassOptions::new().with_allow_update(true))
            .await
            .unwrap();

        assert_eq!(report.updated(), 1);
        let stored = tracker.issue(&handle.key).unwrap();
        assert_eq!(stored.summary, "new");
        assert_eq!(stored.labels, vec!["x", "home"]);
        assert_eq!(
            tracker.mutations(),
            vec![
                TrackerCall::Update(handle.key.clone()),
                TrackerCall::AddLabel(handle.key.clone(), "x".to_string()),
                TrackerCall::AddLabel(handle.key.clone(), "home".to_string()),
                TrackerCall::AddLink(
                    handle.key.clone(),
                    "https://redmine.example.com/issues/3".to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_allow_update_ignores_stale_cache() {
        let tracker = Arc::new(InMemoryTracker::new());
        let mut reconciler = reconciler(vec![Task::new(4, "four")], &tracker);
        reconciler
            .cache_mut()
            .put("4", IssueHandle::new("VS-404", "1"))
            .unwrap();

        let report = reconciler
            .run_pass(&PassOptions::new().with_allow_update(true))
            .await
            .unwrap();

        // The cached issue is gone remotely, so the task is created again
        assert_eq!(report.created(), 1);
        assert_ne!(reconciler.resolver().cache().get("4").unwrap().key, "VS-404");
    }

    #[tokio::test]
    async fn test_duplicate_recorded_and_pass_continues() {
        let tracker = Arc::new(InMemoryTracker::new());
        let a = tracker.insert(StoredIssue::new("VS", "a").with_custom_field(ID_FIELD, 2));
        let b = tracker.insert(StoredIssue::new("VS", "b").with_custom_field(ID_FIELD, 2));
        let mut reconciler = reconciler(vec![Task::new(2, "dup"), Task::new(5, "fresh")], &tracker);

        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();

        assert_eq!(report.duplicates(), 1);
        assert_eq!(report.created(), 1);
        assert_eq!(
            report.duplicate_keys(),
            vec![("2".to_string(), vec![a.key, b.key])]
        );
        assert!(reconciler.resolver().cache().get("2").is_none());
    }

    #[tokio::test]
    async fn test_malformed_estimate_fails_only_that_task() {
        let tracker = Arc::new(InMemoryTracker::new());
        let tasks = vec![
            Task::new(1, "bad").with_field("redmineestimatedhours", "P1D"),
            Task::new(2, "good"),
        ];
        let mut reconciler = reconciler(tasks, &tracker);

        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.created(), 1);
        assert!(matches!(
            report.outcome("1").unwrap().action,
            SyncAction::Failed { .. }
        ));
        assert_eq!(tracker.issues().len(), 1);
    }

    #[tokio::test]
    async fn test_task_without_identifier_reported() {
        let tracker = Arc::new(InMemoryTracker::new());
        let mut reconciler = reconciler(vec![Task::new(0, "outside working set")], &tracker);

        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();

        assert_eq!(report.failed(), 1);
        assert!(report.outcomes[0].identifier.is_none());
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_task_filter() {
        let tracker = Arc::new(InMemoryTracker::new());
        let tasks = vec![Task::new(1, "one"), Task::new(2, "two"), Task::new(3, "three")];
        let mut reconciler = reconciler(tasks, &tracker);

        let report = reconciler
            .run_pass(&PassOptions::new().with_task_filter("2"))
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].identifier.as_deref(), Some("2"));
        assert_eq!(tracker.issues().len(), 1);
    }

    #[tokio::test]
    async fn test_tracker_error_aborts_pass() {
        let tracker = Arc::new(InMemoryTracker::new());
        tracker.fail_next_call("service unavailable");
        let mut reconciler = reconciler(vec![Task::new(1, "one"), Task::new(2, "two")], &tracker);

        let result = reconciler.run_pass(&PassOptions::new()).await;

        assert!(matches!(result, Err(TjsError::Integration(_))));
        assert_eq!(tracker.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_link_failure_keeps_created_issue_cached() {
        let tracker = Arc::new(InMemoryTracker::new());
        tracker.fail_link_calls("remote link rejected");
        let task = Task::new(4, "Linked").with_field("redmineurl", "https://redmine.example.com/issues/4");
        let mut reconciler = reconciler(vec![task], &tracker);

        let result = reconciler.run_pass(&PassOptions::new()).await;

        assert!(matches!(result, Err(TjsError::Integration(_))));
        let created = tracker.issues();
        assert_eq!(created.len(), 1);
        assert_eq!(
            reconciler.resolver().cache().get("4").map(|h| h.key.clone()),
            Some(created[0].key.clone())
        );

        // the next pass finds the issue in the cache instead of creating another
        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();
        assert_eq!(report.skipped(), 1);
        assert_eq!(tracker.issues().len(), 1);
    }

    #[tokio::test]
    async fn test_outcomes_in_source_order() {
        let tracker = Arc::new(InMemoryTracker::new());
        let tasks = vec![Task::new(9, "nine"), Task::new(1, "one"), Task::new(5, "five")];
        let mut reconciler = reconciler(tasks, &tracker);

        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();
        let order: Vec<_> = report
            .outcomes
            .iter()
            .filter_map(|o| o.identifier.clone())
            .collect();
        assert_eq!(order, vec!["9", "1", "5"]);
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn test_sync_action_display() {
        assert_eq!(
            SyncAction::Created { key: "VS-1".to_string() }.to_string(),
            "created VS-1"
        );
        assert_eq!(
            SyncAction::Duplicate {
                keys: vec!["VS-1".to_string(), "VS-2".to_string()]
            }
            .to_string(),
            "duplicate VS-1, VS-2"
        );
    }
}
