//! Integration tests for tjs
//!
//! These tests drive full passes from task list through tracker writes,
//! with the mapping cache persisted on disk between runs.

use std::sync::Arc;
use taskwarrior::Task;
use tempfile::TempDir;
use tjs::cache::MappingCache;
use tjs::config::{validate_config, CredentialSettings, IdentifierKind, TjsConfig};
use tjs::integrations::{InMemoryTracker, ScopedTracker, StoredIssue, TrackerCall};
use tjs::sync::{PassOptions, Reconciler, SyncAction};

const ID_FIELD: &str = "customfield_10035";

type TestReconciler = Reconciler<Vec<Task>, ScopedTracker<Arc<InMemoryTracker>>>;

/// Helper to build a reconciler backed by a cache file in `dir`
fn create_reconciler(
    dir: &TempDir,
    tasks: Vec<Task>,
    tracker: &Arc<InMemoryTracker>,
) -> TestReconciler {
    let config = TjsConfig::new()
        .with_url("https://jira.example.com")
        .with_cache_path(dir.path().join("mapping.json"));
    let cache = MappingCache::load(config.cache_path());
    Reconciler::new(tasks, ScopedTracker::new(Arc::clone(tracker), "VS"), cache, &config)
}

fn sample_tasks() -> Vec<Task> {
    vec![
        Task::new(1, "Renew certificates")
            .with_tag("ops")
            .with_field("redmineestimatedhours", "PT45M"),
        Task::new(2, "Import backlog")
            .with_field("gitlabtitle", "Import GitLab backlog")
            .with_field("gitlabnamespace", "platform"),
    ]
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("tjs").join("config.yaml");

        let mut config = TjsConfig::new()
            .with_url("https://example.atlassian.net")
            .with_project("OPS")
            .with_identifier(IdentifierKind::Uuid);
        config.jira.credential = CredentialSettings::Env {
            var: "JIRA_TOKEN".to_string(),
            user: Some("me@example.com".to_string()),
        };
        config.save(&config_path).unwrap();

        let loaded = TjsConfig::load(&config_path).unwrap();
        assert_eq!(loaded.jira.project, "OPS");
        assert_eq!(loaded.sync.identifier, IdentifierKind::Uuid);
        assert!(matches!(
            loaded.jira.credential,
            CredentialSettings::Env { ref var, .. } if var == "JIRA_TOKEN"
        ));
        assert!(validate_config(&loaded).is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "jira:\n  url: https://jira.example.com\n").unwrap();

        let config = TjsConfig::load(&config_path).unwrap();
        assert_eq!(config.jira.project, "VS");
        assert_eq!(config.jira.id_field, ID_FIELD);
        assert_eq!(config.sync.poll_interval_secs, 60);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_default_config_needs_url() {
        let errors = validate_config(&TjsConfig::default()).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "url"));
    }
}

mod cache_tests {
    use super::*;
    use tjs::integrations::IssueHandle;

    #[test]
    fn test_cache_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mapping.json");

        let mut cache = MappingCache::load(&path);
        cache.put("7", IssueHandle::new("VS-7", "10007")).unwrap();

        let reloaded = MappingCache::load(&path);
        assert_eq!(reloaded.get("7"), Some(&IssueHandle::new("VS-7", "10007")));
    }

    #[test]
    fn test_reset_then_load_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mapping.json");

        let mut cache = MappingCache::load(&path);
        cache.put("1", IssueHandle::new("VS-1", "10001")).unwrap();
        cache.reset().unwrap();

        assert!(MappingCache::load(&path).is_empty());
    }

    #[test]
    fn test_corrupt_file_is_cold_cache() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mapping.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(MappingCache::load(&path).is_empty());
    }
}

mod sync_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_pass_creates_issues() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = Arc::new(InMemoryTracker::new());
        let mut reconciler = create_reconciler(&temp_dir, sample_tasks(), &tracker);

        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();

        assert_eq!(report.created(), 2);
        assert_eq!(report.failed(), 0);

        let issues = tracker.issues();
        assert_eq!(issues.len(), 2);
        let certs = issues.iter().find(|i| i.custom_fields[ID_FIELD] == 1).unwrap();
        assert_eq!(certs.summary, "Renew certificates");
        assert_eq!(certs.labels, vec!["ops"]);
        assert_eq!(certs.original_estimate.as_deref(), Some("45m"));

        let backlog = issues.iter().find(|i| i.custom_fields[ID_FIELD] == 2).unwrap();
        assert_eq!(backlog.summary, "Import GitLab backlog");
        assert_eq!(backlog.labels, vec!["platform"]);
    }

    #[tokio::test]
    async fn test_restart_uses_persisted_cache() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = Arc::new(InMemoryTracker::new());

        let mut first = create_reconciler(&temp_dir, sample_tasks(), &tracker);
        first.run_pass(&PassOptions::new()).await.unwrap();
        tracker.clear_calls();

        // fresh process, same cache file
        let mut second = create_reconciler(&temp_dir, sample_tasks(), &tracker);
        let report = second.run_pass(&PassOptions::new()).await.unwrap();

        assert_eq!(report.skipped(), 2);
        assert!(tracker.calls().is_empty());
        assert_eq!(tracker.issues().len(), 2);
    }

    #[tokio::test]
    async fn test_allow_update_rewrites_existing_issues() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = Arc::new(InMemoryTracker::new());

        let mut first = create_reconciler(&temp_dir, sample_tasks(), &tracker);
        first.run_pass(&PassOptions::new()).await.unwrap();
        tracker.clear_calls();

        let mut changed = sample_tasks();
        changed[0] = Task::new(1, "Renew all certificates").with_tag("security");
        let mut second = create_reconciler(&temp_dir, changed, &tracker);
        let report = second
            .run_pass(&PassOptions::new().with_allow_update(true))
            .await
            .unwrap();

        assert_eq!(report.updated(), 2);
        assert_eq!(tracker.issues().len(), 2);
        let certs = tracker
            .issues()
            .into_iter()
            .find(|i| i.custom_fields[ID_FIELD] == 1)
            .unwrap();
        assert_eq!(certs.summary, "Renew all certificates");
        assert_eq!(certs.labels, vec!["security"]);
        assert!(!tracker
            .mutations()
            .iter()
            .any(|c| matches!(c, TrackerCall::Create(_))));
    }

    #[tokio::test]
    async fn test_legacy_issue_is_adopted() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = Arc::new(InMemoryTracker::new());
        let legacy = tracker.insert(
            StoredIssue::new("VS", "Renew certificates")
                .with_description("Created by an older sync\nTaskWarrior:1"),
        );

        let mut reconciler = create_reconciler(&temp_dir, sample_tasks(), &tracker);
        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();

        assert_eq!(
            report.outcome("1").unwrap().action,
            SyncAction::Skipped { key: legacy.key.clone() }
        );
        assert_eq!(report.created(), 1);
        assert_eq!(
            MappingCache::load(temp_dir.path().join("mapping.json"))
                .get("1")
                .map(|h| h.key.clone()),
            Some(legacy.key)
        );
    }

    #[tokio::test]
    async fn test_duplicates_reported_other_tasks_synced() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = Arc::new(InMemoryTracker::new());
        let a = tracker.insert(StoredIssue::new("VS", "a").with_custom_field(ID_FIELD, 1));
        let b = tracker.insert(StoredIssue::new("VS", "b").with_custom_field(ID_FIELD, 1));

        let mut reconciler = create_reconciler(&temp_dir, sample_tasks(), &tracker);
        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();

        assert_eq!(report.duplicates(), 1);
        assert_eq!(report.created(), 1);
        assert_eq!(
            report.duplicate_keys(),
            vec![("1".to_string(), vec![a.key, b.key])]
        );
    }

    #[tokio::test]
    async fn test_issues_in_other_projects_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = Arc::new(InMemoryTracker::new());
        tracker.insert(StoredIssue::new("OPS", "elsewhere").with_custom_field(ID_FIELD, 1));

        let mut reconciler = create_reconciler(&temp_dir, sample_tasks(), &tracker);
        let report = reconciler.run_pass(&PassOptions::new()).await.unwrap();

        assert_eq!(report.created(), 2);
        assert!(tracker
            .issues()
            .iter()
            .filter(|i| i.project == "VS")
            .all(|i| i.key.starts_with("VS-")));
    }
}

mod taskwarrior_tests {
    use super::*;
    use tjs::source::TaskSource;

    #[tokio::test]
    #[ignore = "requires the task binary"]
    async fn test_load_pending_from_taskwarrior() {
        let temp_dir = TempDir::new().unwrap();
        let taskrc = temp_dir.path().join("taskrc");
        std::fs::write(&taskrc, "").unwrap();

        let data = temp_dir.path().join("data");
        let status = std::process::Command::new("task")
            .args(["rc.confirmation=off", "add", "Check integration"])
            .env("TASKRC", &taskrc)
            .env("TASKDATA", &data)
            .status()
            .unwrap();
        assert!(status.success());

        let tw = taskwarrior::TaskWarrior::default()
            .with_taskrc(&taskrc)
            .with_data_location(&data);

        let tasks = tw.load_pending_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "Check integration");
        assert_eq!(IdentifierKind::Id.of(&tasks[0]).as_deref(), Some("1"));
    }
}
