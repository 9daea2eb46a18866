//! tjs - Taskwarrior → JIRA sync
//!
//! Main entry point for the tjs CLI.

use clap::Parser;
use crossterm::style::Color;
use serde_json::Value;
use std::path::Path;
use std::process;
use tjs::auth::provider_from_settings;
use tjs::cache::MappingCache;
use tjs::commands::{Cli, Commands};
use tjs::config::{validate_config, validate_config_result, TjsConfig};
use tjs::integrations::{Issue, IssueTracker, JiraClient, ScopedTracker};
use tjs::style;
use tjs::sync::{lookup_jql, DaemonConfig, PassOptions, PassReport, Reconciler, SyncAction, SyncDaemon};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = tjs::logging::init(cli.verbosity) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> tjs::Result<()> {
    // Init does not need an existing config
    if let Commands::Init { force } = cli.command {
        return handle_init_command(&cli.config_path(), force);
    }

    let config_path = cli.config_path();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::List { task_id, long } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(handle_list_command(&config, task_id.as_deref(), long))
        }
        Commands::Push {
            task_id,
            allow_update,
            once,
            verbose,
        } => {
            let mut options = PassOptions::new().with_allow_update(allow_update);
            if let Some(id) = task_id {
                options = options.with_task_filter(id);
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(handle_push_command(&config, options, once, verbose))
        }
        Commands::ResetCache => handle_reset_cache_command(&config),
        Commands::Config => handle_config_command(&config, &config_path),
        Commands::Init { .. } => Ok(()),
    }
}

/// Load the config file and apply command-line overrides
///
/// An explicitly given file must exist; the default location may be absent.
fn load_config(cli: &Cli) -> tjs::Result<TjsConfig> {
    let path = cli.config_path();
    let mut config = if cli.config.is_some() {
        TjsConfig::load(&path)?
    } else {
        TjsConfig::load_or_default(&path)?
    };

    if let Some(ref project) = cli.project {
        config.jira.project = project.clone();
    }
    Ok(config)
}

/// Build the project-scoped JIRA client
fn connect(config: &TjsConfig) -> tjs::Result<ScopedTracker<JiraClient>> {
    validate_config_result(config)?;

    let provider = provider_from_settings(&config.jira.credential);
    tracing::debug!(
        url = %config.jira.url,
        project = %config.jira.project,
        credential = %provider.describe(),
        "Connecting to JIRA"
    );
    let client = JiraClient::from_provider(&config.jira.url, provider.as_ref())?;
    Ok(ScopedTracker::new(client, config.jira.project.clone()))
}

async fn handle_list_command(
    config: &TjsConfig,
    task_id: Option<&str>,
    long: bool,
) -> tjs::Result<()> {
    let tracker = connect(config)?;

    let condition = match task_id {
        Some(id) => lookup_jql(&config.jira.id_field, &config.sync.legacy_marker, id),
        None => String::new(),
    };
    let issues = tracker
        .search(&format!("{} ORDER BY created DESC", condition))
        .await?;

    if issues.is_empty() {
        println!("{}", style::dim("No issues found"));
        return Ok(());
    }

    for issue in &issues {
        println!("{}: {}", style::issue_key(&issue.key), issue.fields.summary);
        if long {
            if let Some(ref issue_type) = issue.fields.issue_type {
                println!("    {}", style::type_style(&issue_type.name));
            }
            print_issue_fields(issue)?;
            println!();
        }
    }
    Ok(())
}

fn print_issue_fields(issue: &Issue) -> tjs::Result<()> {
    let Value::Object(fields) = serde_json::to_value(&issue.fields)? else {
        return Ok(());
    };

    for (name, value) in fields {
        let rendered = match value {
            Value::Null => continue,
            Value::String(s) => s,
            other => other.to_string(),
        };
        println!("    {}: {}", style::dim(&name), rendered);
    }
    Ok(())
}

async fn handle_push_command(
    config: &TjsConfig,
    options: PassOptions,
    once: bool,
    verbose: bool,
) -> tjs::Result<()> {
    let tracker = connect(config)?;
    let cache = MappingCache::load(config.cache_path());
    let reconciler = Reconciler::new(config.taskwarrior.task_warrior(), tracker, cache, config);

    let daemon_config = DaemonConfig::new().with_poll_interval(config.poll_interval());
    let mut daemon = SyncDaemon::new(reconciler, options, daemon_config);

    let stats = daemon
        .run(once, |report| print_pass_report(report, verbose))
        .await?;

    if !once {
        println!(
            "Stopped after {} passes ({} failed): {} created, {} updated",
            stats.passes, stats.failed_passes, stats.created, stats.updated
        );
    }
    Ok(())
}

fn print_pass_report(report: &PassReport, verbose: bool) {
    println!(
        "{}",
        style::header(&format!(
            "Pass at {}",
            report.started_at.format("%Y-%m-%d %H:%M:%S")
        ))
    );

    for outcome in &report.outcomes {
        let identifier = outcome.identifier.as_deref().unwrap_or("?");
        let detail = match &outcome.action {
            SyncAction::Created { key } | SyncAction::Skipped { key } | SyncAction::Updated { key } => {
                style::issue_key(key).to_string()
            }
            SyncAction::Duplicate { keys } => style::error(&keys.join(", ")).to_string(),
            SyncAction::Failed { reason } => style::error(reason).to_string(),
        };
        println!(
            "  {} {} {} {}",
            style::action_style(&outcome.action),
            style::task_id(identifier),
            detail,
            style::dim(&outcome.description)
        );

        if verbose {
            if let Some(ref fields) = outcome.fields {
                match serde_json::to_string_pretty(fields) {
                    Ok(json) => {
                        for line in json.lines() {
                            println!("      {}", style::dim(line));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to render mapped fields"),
                }
            }
        }
    }

    for (identifier, keys) in report.duplicate_keys() {
        eprintln!("{}", style::duplicate_warning(&identifier, &keys));
    }

    println!(
        "  {} created, {} updated, {} skipped, {} duplicates, {} failed ({} ms)",
        style::count(report.created(), Color::Green),
        style::count(report.updated(), Color::Yellow),
        style::count(report.skipped(), Color::DarkGrey),
        style::count(report.duplicates(), Color::Red),
        style::count(report.failed(), Color::Red),
        report.duration().num_milliseconds()
    );
}

fn handle_reset_cache_command(config: &TjsConfig) -> tjs::Result<()> {
    let mut cache = MappingCache::load(config.cache_path());
    let cleared = cache.len();
    cache.reset()?;

    println!(
        "✓ Cleared {} cached mapping(s) in {}",
        cleared,
        style::path(&config.cache_path().display().to_string())
    );
    Ok(())
}

fn handle_init_command(config_file: &Path, force: bool) -> tjs::Result<()> {
    if config_file.exists() && !force {
        println!("Configuration already exists at {}", config_file.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    TjsConfig::new().save(config_file)?;

    println!("✓ Created configuration at {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. Set jira.url and jira.project");
    println!("  2. Store your API token with `pass insert jira`, or switch");
    println!("     jira.credential to `source: env`");
    println!("  3. Check the result:");
    println!("     tjs config");
    println!("     tjs push --once");

    Ok(())
}

fn handle_config_command(config: &TjsConfig, config_file: &Path) -> tjs::Result<()> {
    let source = if config_file.exists() {
        config_file.display().to_string()
    } else {
        "defaults".to_string()
    };
    println!("{} {}", style::header("Configuration:"), style::path(&source));
    println!();
    print!("{}", serde_yaml::to_string(config)?);
    println!();

    let cache = MappingCache::load(config.cache_path()).stats();
    let updated = cache
        .updated_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "{} {} ({} entries, updated {})",
        style::header("Mapping cache:"),
        style::path(&config.cache_path().display().to_string()),
        cache.entry_count,
        updated
    );
    println!();

    match validate_config(config) {
        Ok(()) => println!("{}", style::success("✓ Configuration is valid")),
        Err(errors) => {
            println!("{}", style::warning("Configuration problems:"));
            for error in errors {
                println!("  - {}", error);
            }
        }
    }
    Ok(())
}
