//! Terminal styling utilities
//!
//! Consistent colors for sync output. Uses crossterm for cross-platform
//! terminal colors.

use crate::sync::SyncAction;
use crossterm::style::{StyledContent, Stylize};

/// Outcome tag colors
/// - created: Green
/// - updated: Yellow
/// - skipped: Dim
/// - duplicate/failed: Red
pub fn action_style(action: &SyncAction) -> StyledContent<String> {
    let label = format!("{:<9}", action.label());
    match action {
        SyncAction::Created { .. } => label.green(),
        SyncAction::Updated { .. } => label.yellow(),
        SyncAction::Skipped { .. } => label.dark_grey(),
        SyncAction::Duplicate { .. } => label.red().bold(),
        SyncAction::Failed { .. } => label.red(),
    }
}

/// Issue type colors
/// - bug: Red
/// - task: Cyan
/// - story/feature: Green
/// - epic: Magenta
pub fn type_style(issue_type: &str) -> StyledContent<String> {
    let label = format!("[{}]", issue_type);
    match issue_type.to_lowercase().as_str() {
        "epic" => label.magenta(),
        "story" | "feature" => label.green(),
        "bug" => label.red(),
        "task" | "sub-task" => label.cyan(),
        _ => label.white(),
    }
}

/// Count styling: dim when zero, colored otherwise
pub fn count(n: usize, color: crossterm::style::Color) -> StyledContent<String> {
    if n == 0 {
        n.to_string().dark_grey()
    } else {
        n.to_string().with(color)
    }
}

/// Section headers
pub fn header(text: &str) -> StyledContent<String> {
    text.to_string().bold()
}

/// Dim/muted text
pub fn dim(text: &str) -> StyledContent<String> {
    text.to_string().dark_grey()
}

/// Success text
pub fn success(text: &str) -> StyledContent<String> {
    text.to_string().green()
}

/// Warning text
pub fn warning(text: &str) -> StyledContent<String> {
    text.to_string().yellow()
}

/// Error text
pub fn error(text: &str) -> StyledContent<String> {
    text.to_string().red()
}

/// Warning line for a task claimed by several issues
pub fn duplicate_warning(identifier: &str, keys: &[String]) -> String {
    format!(
        "{} task {} matches more than one issue: {}",
        warning("warning:"),
        task_id(identifier),
        keys.join(", ")
    )
}

/// Issue key styling
pub fn issue_key(key: &str) -> StyledContent<String> {
    key.to_string().cyan()
}

/// Task identifier styling
pub fn task_id(id: &str) -> StyledContent<String> {
    format!("#{}", id).bold()
}

/// Path styling
pub fn path(p: &str) -> StyledContent<String> {
    p.to_string().blue()
}
