//! Configuration system
//!
//! Loads ~/.config/tjs/config.yaml with:
//! - JIRA instance, project, identifier field and credential source
//! - Field mapping rules (which task attributes feed which issue fields)
//! - Sync settings (identifier kind, poll interval, cache location)
//! - Taskwarrior invocation overrides

mod tjs_config;
pub mod validation;

pub use tjs_config::{
    CredentialSettings, IdentifierKind, JiraSettings, LinkField, MappingRules, SyncSettings,
    TaskwarriorSettings, TjsConfig,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
