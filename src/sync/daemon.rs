//! Sync daemon implementation
//!
//! Runs reconciliation passes once or on a fixed interval until Ctrl-C or
//! SIGTERM. Pass failures in continuous mode are logged and the next pass
//! runs on schedule.

use super::reconciler::{PassOptions, PassReport, Reconciler};
use crate::integrations::IssueTracker;
use crate::source::TaskSource;
use crate::Result;
use chrono::Utc;
use std::time::Duration;

/// Default poll interval (60 seconds)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default interval between heartbeat log lines while waiting
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Time between the end of one pass and the start of the next
    pub poll_interval: Duration,

    /// Heartbeat period while idle
    pub heartbeat_interval: Duration,

    /// Stop after this many passes (continuous mode only)
    pub max_passes: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_passes: None,
        }
    }
}

impl DaemonConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Stop after a fixed number of passes
    pub fn with_max_passes(mut self, passes: u64) -> Self {
        self.max_passes = Some(passes);
        self
    }
}

/// Counters over the daemon's lifetime
#[derive(Debug, Clone, Default)]
pub struct DaemonStats {
    pub passes: u64,
    pub failed_passes: u64,
    pub created: usize,
    pub updated: usize,
    pub duplicates: usize,
}

impl DaemonStats {
    fn record(&mut self, report: &PassReport) {
        self.passes += 1;
        self.created += report.created();
        self.updated += report.updated();
        self.duplicates += report.duplicates();
    }
}

/// Why the idle wait ended
enum Wake {
    NextPass,
    Shutdown,
}

/// Ctrl-C / SIGTERM listener, registered once for the daemon's lifetime
///
/// Signals arriving during a pass are kept and end the following wait.
struct ShutdownSignal {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = signal(SignalKind::terminate()).map_err(|e| {
            crate::TjsError::Other(format!("Failed to set up SIGTERM handler: {}", e))
        })?;
        let sigint = signal(SignalKind::interrupt()).map_err(|e| {
            crate::TjsError::Other(format!("Failed to set up SIGINT handler: {}", e))
        })?;
        Ok(Self { sigterm, sigint })
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = self.sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, initiating graceful shutdown");
        }
    }
}

/// Polling driver around a [`Reconciler`]
pub struct SyncDaemon<S, T> {
    reconciler: Reconciler<S, T>,
    options: PassOptions,
    config: DaemonConfig,
    stats: DaemonStats,
}

impl<S: TaskSource, T: IssueTracker> SyncDaemon<S, T> {
    pub fn new(reconciler: Reconciler<S, T>, options: PassOptions, config: DaemonConfig) -> Self {
        Self {
            reconciler,
            options,
            config,
            stats: DaemonStats::default(),
        }
    }

    pub fn stats(&self) -> &DaemonStats {
        &self.stats
    }

    pub fn reconciler(&self) -> &Reconciler<S, T> {
        &self.reconciler
    }

    /// Run one pass, propagating any error
    pub async fn run_once(&mut self) -> Result<PassReport> {
        let report = self.reconciler.run_pass(&self.options).await?;
        self.stats.record(&report);
        Ok(report)
    }

    /// Run passes until stopped
    ///
    /// With `once`, a single pass runs and its error (if any) is returned.
    /// Otherwise errors are logged and passes repeat every poll interval
    /// until a shutdown signal or `max_passes`.
    pub async fn run<F>(&mut self, once: bool, mut on_report: F) -> Result<DaemonStats>
    where
        F: FnMut(&PassReport),
    {
        if once {
            let report = self.run_once().await?;
            on_report(&report);
            return Ok(self.stats.clone());
        }

        let mut shutdown = ShutdownSignal::new()?;
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Sync daemon started"
        );

        loop {
            match self.run_once().await {
                Ok(report) => on_report(&report),
                Err(e) => {
                    self.stats.passes += 1;
                    self.stats.failed_passes += 1;
                    tracing::error!(error = %e, "Sync pass failed, retrying next interval");
                }
            }

            if self
                .config
                .max_passes
                .is_some_and(|max| self.stats.passes >= max)
            {
                tracing::debug!(passes = self.stats.passes, "Pass limit reached");
                break;
            }

            match self.wait_for_next_pass(&mut shutdown).await {
                Wake::NextPass => {}
                Wake::Shutdown => break,
            }
        }

        tracing::info!(
            passes = self.stats.passes,
            failed = self.stats.failed_passes,
            created = self.stats.created,
            updated = self.stats.updated,
            "Sync daemon shutdown complete"
        );
        Ok(self.stats.clone())
    }

    /// Sleep until the next pass, logging a heartbeat meanwhile
    async fn wait_for_next_pass(&self, shutdown: &mut ShutdownSignal) -> Wake {
        let next_pass = tokio::time::sleep(self.config.poll_interval);
        tokio::pin!(next_pass);
        let mut heartbeat = self.heartbeat();

        loop {
            tokio::select! {
                _ = &mut next_pass => return Wake::NextPass,
                _ = heartbeat.tick() => self.log_heartbeat(),
                _ = shutdown.recv() => return Wake::Shutdown,
            }
        }
    }

    fn heartbeat(&self) -> tokio::time::Interval {
        let period = self.config.heartbeat_interval.max(Duration::from_millis(1));
        // no tick right after the pass summary
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval
    }

    fn log_heartbeat(&self) {
        tracing::info!(
            at = %Utc::now().format("%Y-%m-%d %H:%M:%S"),
            passes = self.stats.passes,
            "Waiting for next pass"
        );
    }
}
