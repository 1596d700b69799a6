//! Long-running per-key scan loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ScanError, ScanResult};
use crate::scanner::ScanTick;

/// One scan tick for a key. Implemented by both scanners so the runner
/// can drive either.
pub trait Scan: Send + Sync {
    fn scan(&self, key: &str) -> ScanResult<ScanTick>;
}

/// Drives a scanner for one key until shutdown or configuration drift.
///
/// Each tick runs on the blocking pool (the check invocation is
/// synchronous and may block for its full duration), then the loop
/// sleeps for the interval the tick returned. `NotFound` means the key
/// was reconfigured away and stops the loop; other errors are logged
/// and retried on the default cadence.
pub struct IntervalRunner {
    scanner: Arc<dyn Scan>,
    key: String,
    default_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl IntervalRunner {
    pub fn new(
        scanner: Arc<dyn Scan>,
        key: &str,
        default_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            scanner,
            key: key.to_string(),
            default_interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        loop {
            let scanner = Arc::clone(&self.scanner);
            let key = self.key.clone();
            let tick = tokio::task::spawn_blocking(move || scanner.scan(&key)).await;

            let wait = match tick {
                Ok(Ok(tick)) => {
                    debug!(key = %self.key, outcome = ?tick.outcome, "scan tick complete");
                    tick.next_interval
                }
                Ok(Err(ScanError::NotFound(what))) => {
                    info!(key = %self.key, %what, "key no longer configured, stopping");
                    return;
                }
                Ok(Err(err)) => {
                    warn!(key = %self.key, error = %err, "scan tick failed");
                    self.default_interval
                }
                Err(join) => {
                    warn!(key = %self.key, error = %join, "scan tick panicked");
                    self.default_interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = self.shutdown.changed() => {
                    // A closed channel counts as shutdown.
                    if changed.is_err() || *self.shutdown.borrow_and_update() {
                        info!(key = %self.key, "scan loop shutting down");
                        return;
                    }
                }
            }
        }
    }
}
