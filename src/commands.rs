//! CLI command definitions
//!
//! All CLI structs and subcommand enums are defined here.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tjs - push Taskwarrior tasks into JIRA
#[derive(Parser, Debug)]
#[command(name = "tjs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/tjs/config.yaml)
    #[arg(short, long, global = true, env = "TJS_CONFIG")]
    pub config: Option<PathBuf>,

    /// JIRA project key (overrides the config file)
    #[arg(short, long, global = true)]
    pub project: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Config file to use
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::TjsConfig::default_path)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List issues of the project, newest first
    List {
        /// Only issues belonging to this task
        #[arg(short = 'i', long = "task-id")]
        task_id: Option<String>,

        /// Show every non-empty field
        #[arg(short, long)]
        long: bool,
    },

    /// Push pending tasks into JIRA
    Push {
        /// Only push this task
        #[arg(short = 'i', long = "task-id")]
        task_id: Option<String>,

        /// Overwrite issues that already exist
        #[arg(short = 'u', long)]
        allow_update: bool,

        /// Run a single pass instead of polling
        #[arg(short = '1', long)]
        once: bool,

        /// Print the fields sent for each task
        #[arg(long)]
        verbose: bool,
    },

    /// Forget every cached task → issue mapping
    ResetCache,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_push() {
        let cli = Cli::try_parse_from(["tjs", "-p", "OPS", "push", "-u", "-1", "-i", "7"]).unwrap();
        assert_eq!(cli.project.as_deref(), Some("OPS"));
        match cli.command {
            Commands::Push {
                task_id,
                allow_update,
                once,
                verbose,
            } => {
                assert_eq!(task_id.as_deref(), Some("7"));
                assert!(allow_update);
                assert!(once);
                assert!(!verbose);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_long() {
        let cli = Cli::try_parse_from(["tjs", "list", "--long", "--task-id", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List { long: true, task_id: Some(ref id) } if id == "3"
        ));
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["tjs", "-vv", "reset-cache"]).unwrap();
        assert_eq!(cli.verbosity, 2);
        assert!(matches!(cli.command, Commands::ResetCache));
    }

    #[test]
    fn test_push_verbose_is_distinct_from_log_level() {
        let cli = Cli::try_parse_from(["tjs", "push", "--verbose"]).unwrap();
        assert_eq!(cli.verbosity, 0);
        assert!(matches!(cli.command, Commands::Push { verbose: true, .. }));
    }

    #[test]
    fn test_config_path_override() {
        let cli = Cli::try_parse_from(["tjs", "-c", "/tmp/tjs.yaml", "config"]).unwrap();
        assert_eq!(cli.config_path(), PathBuf::from("/tmp/tjs.yaml"));
    }
}
