//! Configuration validation
//!
//! Validates tjs configuration for correctness:
//! - JIRA URL and project are set
//! - Mapping rules name real attributes
//! - Poll interval is positive
//! - Credential source is usable

use super::tjs_config::{CredentialSettings, TjsConfig};
use crate::TjsError;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref section) = self.section {
            write!(f, "{}.{}: {}", section, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a tjs configuration, collecting every problem
pub fn validate_config(config: &TjsConfig) -> ValidationResult {
    let mut errors = Vec::new();

    validate_jira(config, &mut errors);
    validate_mapping(config, &mut errors);

    if config.sync.poll_interval_secs == 0 {
        errors.push(
            ValidationError::new("poll_interval_secs", "Poll interval must be greater than 0")
                .in_section("sync"),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_jira(config: &TjsConfig, errors: &mut Vec<ValidationError>) {
    let jira = &config.jira;

    if jira.url.is_empty() {
        errors.push(ValidationError::new("url", "JIRA URL must be set").in_section("jira"));
    } else if !jira.url.starts_with("http://") && !jira.url.starts_with("https://") {
        errors.push(
            ValidationError::new("url", format!("Invalid JIRA URL: {}", jira.url))
                .in_section("jira"),
        );
    }

    if jira.project.trim().is_empty() {
        errors.push(
            ValidationError::new("project", "JIRA project key cannot be empty").in_section("jira"),
        );
    }

    if jira.id_field.trim().is_empty() {
        errors.push(
            ValidationError::new("id_field", "Identifier field cannot be empty")
                .in_section("jira"),
        );
    }

    match jira.credential {
        CredentialSettings::Pass { ref entry, .. } if entry.trim().is_empty() => {
            errors.push(
                ValidationError::new("credential.entry", "pass entry cannot be empty")
                    .in_section("jira"),
            );
        }
        CredentialSettings::Env { ref var, .. } => {
            let name = var.trim_start_matches('$');
            if name.is_empty() {
                errors.push(
                    ValidationError::new("credential.var", "Environment variable name cannot be empty")
                        .in_section("jira"),
                );
            } else if std::env::var(name).is_err() {
                tracing::warn!(
                    env_var = %name,
                    "Environment variable not set (this may be intentional if set at runtime)"
                );
            }
        }
        _ => {}
    }
}

fn validate_mapping(config: &TjsConfig, errors: &mut Vec<ValidationError>) {
    let mapping = &config.mapping;

    if mapping.default_issue_type.trim().is_empty() {
        errors.push(
            ValidationError::new("default_issue_type", "Default issue type cannot be empty")
                .in_section("mapping"),
        );
    }

    let named_fields = mapping
        .title_fields
        .iter()
        .chain(mapping.label_fields.iter())
        .chain(mapping.link_fields.iter().map(|l| &l.field));
    if named_fields.into_iter().any(|f| f.trim().is_empty()) {
        errors.push(
            ValidationError::new("fields", "Attribute names cannot be empty").in_section("mapping"),
        );
    }

    for link in &mapping.link_fields {
        if link.title.trim().is_empty() {
            errors.push(
                ValidationError::new(
                    "link_fields",
                    format!("Link for '{}' needs a title", link.field),
                )
                .in_section("mapping"),
            );
        }
    }
}

/// Validate configuration and return a Result
pub fn validate_config_result(config: &TjsConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        TjsError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
