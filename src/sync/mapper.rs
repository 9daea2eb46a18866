//! Task → issue field mapping

use super::duration::{format_estimate, parse_duration};
use crate::config::MappingRules;
use crate::integrations::{IssueFields, RemoteLink};
use crate::Result;
use serde_json::Value;
use taskwarrior::Task;

/// Derives issue fields from task attributes according to [`MappingRules`]
#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    rules: MappingRules,
}

impl FieldMapper {
    pub fn new(rules: MappingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &MappingRules {
        &self.rules
    }

    /// Map a task to the fields of its issue
    ///
    /// Fails with `MalformedDuration` when the estimate attribute is present
    /// but not a valid duration.
    pub fn map_fields(&self, task: &Task) -> Result<IssueFields> {
        let summary = self
            .rules
            .title_fields
            .iter()
            .find_map(|field| task.text(field))
            .unwrap_or_else(|| task.description.clone());

        let description = task
            .record()
            .into_iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("\n");

        let mut labels = task.tags.clone();
        labels.extend(
            self.rules
                .label_fields
                .iter()
                .filter_map(|field| task.text(field)),
        );

        let issue_type = task
            .text(&self.rules.type_field)
            .unwrap_or_else(|| self.rules.default_issue_type.clone());

        let original_estimate = match task.text(&self.rules.estimate_field) {
            Some(raw) => Some(format_estimate(parse_duration(&raw)?)),
            None => None,
        };

        let links = self
            .rules
            .link_fields
            .iter()
            .filter_map(|link| {
                task.text(&link.field)
                    .map(|url| RemoteLink::new(url, &link.title))
            })
            .collect();

        Ok(IssueFields {
            summary,
            description,
            labels,
            issue_type,
            original_estimate,
            links,
        })
    }

    /// Value stored in the identifier field of a created issue
    ///
    /// Numeric identifiers are stored as numbers so they compare unquoted
    /// in JQL.
    pub fn identifier_value(identifier: &str) -> Value {
        match identifier.parse::<u64>() {
            Ok(number) => Value::from(number),
            Err(_) => Value::from(identifier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkField;
    use crate::TjsError;

    fn mapper() -> FieldMapper {
        FieldMapper::default()
    }

    #[test]
    fn test_bare_task() {
        let fields = mapper().map_fields(&Task::new(3, "Water plants")).unwrap();

        assert_eq!(fields.summary, "Water plants");
        assert_eq!(fields.description, "id: 3\ndescription: Water plants");
        assert!(fields.labels.is_empty());
        assert_eq!(fields.issue_type, "Task");
        assert!(fields.original_estimate.is_none());
        assert!(fields.links.is_empty());
    }

    #[test]
    fn test_title_override_priority() {
        let task = Task::new(1, "raw")
            .with_field("redminesubject", "Redmine subject")
            .with_field("gitlabtitle", "GitLab title");
        assert_eq!(mapper().map_fields(&task).unwrap().summary, "GitLab title");

        let task = Task::new(1, "raw").with_field("redminesubject", "Redmine subject");
        assert_eq!(
            mapper().map_fields(&task).unwrap().summary,
            "Redmine subject"
        );
    }

    #[test]
    fn test_description_dumps_record() {
        let task = Task::new(4, "Fix build")
            .with_uuid("u-4")
            .with_tag("ci")
            .with_tag("urgent")
            .with_field("status", "pending")
            .with_field("project", "infra")
            .with_field("urgency", 4.5);

        let fields = mapper().map_fields(&task).unwrap();
        assert_eq!(
            fields.description,
            "id: 4\nuuid: u-4\ndescription: Fix build\ntags: ci, urgent\nproject: infra\nstatus: pending\nurgency: 4.5"
        );
    }

    #[test]
    fn test_labels_tags_then_fields_without_dedup() {
        let task = Task::new(5, "x")
            .with_tag("infra")
            .with_field("gitlabnamespace", "ops")
            .with_field("project", "infra");

        let fields = mapper().map_fields(&task).unwrap();
        assert_eq!(fields.labels, vec!["infra", "infra", "ops"]);
    }

    #[test]
    fn test_issue_type_override() {
        let task = Task::new(6, "x").with_field("redminetracker", "Bug");
        assert_eq!(mapper().map_fields(&task).unwrap().issue_type, "Bug");
    }

    #[test]
    fn test_estimate() {
        let task = Task::new(7, "x").with_field("redmineestimatedhours", "P0DT30M");
        assert_eq!(
            mapper().map_fields(&task).unwrap().original_estimate.as_deref(),
            Some("30m")
        );

        let task = Task::new(7, "x").with_field("redmineestimatedhours", "PT1H30M");
        assert_eq!(
            mapper().map_fields(&task).unwrap().original_estimate.as_deref(),
            Some("90m")
        );
    }

    #[test]
    fn test_malformed_estimate() {
        let task = Task::new(8, "x").with_field("redmineestimatedhours", "P1D");
        assert!(matches!(
            mapper().map_fields(&task),
            Err(TjsError::MalformedDuration(_))
        ));
    }

    #[test]
    fn test_links() {
        let task = Task::new(9, "x").with_field("redmineurl", "https://redmine.example.com/issues/9");
        let fields = mapper().map_fields(&task).unwrap();
        assert_eq!(
            fields.links,
            vec![RemoteLink::new("https://redmine.example.com/issues/9", "Redmine")]
        );
    }

    #[test]
    fn test_custom_rules() {
        let rules = MappingRules {
            title_fields: vec!["jiratitle".to_string()],
            label_fields: vec![],
            type_field: "kind".to_string(),
            default_issue_type: "Story".to_string(),
            estimate_field: "estimate".to_string(),
            link_fields: vec![LinkField {
                field: "gitlaburl".to_string(),
                title: "GitLab".to_string(),
            }],
        };
        let task = Task::new(10, "raw")
            .with_field("jiratitle", "Custom")
            .with_field("project", "ignored")
            .with_field("gitlaburl", "https://gitlab.example.com/1");

        let fields = FieldMapper::new(rules).map_fields(&task).unwrap();
        assert_eq!(fields.summary, "Custom");
        assert!(fields.labels.is_empty());
        assert_eq!(fields.issue_type, "Story");
        assert_eq!(fields.links[0].title, "GitLab");
    }

    #[test]
    fn test_deterministic() {
        let task = Task::new(11, "x")
            .with_tag("a")
            .with_field("redmineestimatedhours", "PT2H");
        assert_eq!(
            mapper().map_fields(&task).unwrap(),
            mapper().map_fields(&task).unwrap()
        );
    }

    #[test]
    fn test_identifier_value() {
        assert_eq!(FieldMapper::identifier_value("42"), Value::from(42u64));
        assert_eq!(FieldMapper::identifier_value("abc-1"), Value::from("abc-1"));
    }
}
