//! Periodic performance monitoring loop.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::report::PerformanceReporter;
use super::types::PerformanceReport;
use crate::error::{Error, Result};
use crate::{clog, clog_debug, clog_trace};

/// Generates a report every `interval` until cancelled, then flushes the
/// benchmark history to `history_file`.
pub struct PerformanceMonitor {
    reporter: PerformanceReporter,
    interval: Duration,
    history_file: Option<PathBuf>,
    report_tx: Option<mpsc::UnboundedSender<PerformanceReport>>,
}

impl PerformanceMonitor {
    pub fn new(reporter: PerformanceReporter, interval: Duration, history_file: Option<PathBuf>) -> Self {
        Self {
            reporter,
            interval: interval.max(Duration::from_millis(1)),
            history_file,
            report_tx: None,
        }
    }

    /// Forward each generated report to `tx`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<PerformanceReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    pub fn spawn(self) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        clog_debug!("PerformanceMonitor::spawn interval={:?}", self.interval);

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            let mut iterations: u64 = 0;

            loop {
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        clog_debug!("PerformanceMonitor cancelled after {} iteration(s)", iterations);
                        break;
                    }
                    _ = interval.tick() => {
                        iterations += 1;
                        clog_trace!("PerformanceMonitor: iteration {}", iterations);
                        let report = self.reporter.generate_report().await;
                        if let Some(tx) = &self.report_tx {
                            if tx.send(report).is_err() {
                                clog_debug!("PerformanceMonitor: report channel closed");
                            }
                        }
                    }
                }
            }

            if let Some(path) = &self.history_file {
                self.reporter.state().flush(path).await?;
                clog!("PerformanceMonitor flushed history to {}", path.display());
            }
            Ok::<_, Error>(())
        });

        MonitorHandle { cancel, join }
    }
}

/// Handle to a running monitor.
pub struct MonitorHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<()>>,
}

impl MonitorHandle {
    /// Signal the loop to stop after the current iteration.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Shut down and wait for the final history flush.
    pub async fn stop(self) -> Result<()> {
        self.shutdown();
        self.join.await.map_err(|e| Error::TaskJoin(e.to_string()))?
    }
}
