//! Sync engine
//!
//! One-way push of local tasks into the issue tracker.
//!
//! # Architecture
//!
//! A pass loads pending tasks and walks them in order. Each task is
//! resolved to at most one issue, then created, skipped, or updated:
//!
//! 1. **Resolve**: mapping cache first (unless updating), then a tracker
//!    search on the identifier field or the legacy description marker
//! 2. **Map**: task attributes become summary, description, labels, type,
//!    estimate and links
//! 3. **Write**: create the issue, or overwrite it when updates are allowed
//!
//! The [`SyncDaemon`] repeats passes on a fixed interval.
//!
//! # Example
//!
//! ```ignore
//! use tjs::sync::{DaemonConfig, PassOptions, Reconciler, SyncDaemon};
//!
//! let reconciler = Reconciler::new(task_warrior, tracker, cache, &config);
//! let mut daemon = SyncDaemon::new(reconciler, PassOptions::new(), DaemonConfig::new());
//! daemon.run(false, |report| println!("{} created", report.created())).await?;
//! ```

mod daemon;
pub mod duration;
mod mapper;
mod reconciler;
mod resolver;

pub use daemon::{DaemonConfig, DaemonStats, SyncDaemon, DEFAULT_POLL_INTERVAL};
pub use duration::{format_estimate, parse_duration};
pub use mapper::FieldMapper;
pub use reconciler::{PassOptions, PassReport, Reconciler, SyncAction, TaskOutcome};
pub use resolver::{lookup_jql, IssueResolver, Resolution};
