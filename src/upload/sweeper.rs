//! Background sweeper for expired uploads.
//!
//! Runs [`UploadManager::sweep`] on a fixed interval until cancelled.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::manager::UploadManager;
use super::store::SessionRepository;

/// Handle to a running sweeper task.
pub struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn the sweeper on the current runtime.
    ///
    /// The first sweep happens one full interval after start.
    pub fn start<R>(manager: Arc<UploadManager<R>>, period: Duration) -> Self
    where
        R: SessionRepository + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(manager, period, cancel.clone()));
        Self { cancel, handle }
    }

    /// Token that stops the sweeper when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the sweeper and wait for it to exit.
    ///
    /// A sweep that is already running finishes first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("Upload sweeper task failed: {}", e);
        }
    }
}

async fn run<R>(manager: Arc<UploadManager<R>>, period: Duration, cancel: CancellationToken)
where
    R: SessionRepository + 'static,
{
    info!(
        "Upload sweeper started (interval: {} seconds)",
        period.as_secs()
    );

    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {
                let manager = Arc::clone(&manager);
                match tokio::task::spawn_blocking(move || manager.sweep(Utc::now())).await {
                    Ok(report) if report.expired_sessions + report.orphaned_files + report.errors > 0 => {
                        info!(
                            expired_sessions = report.expired_sessions,
                            orphaned_files = report.orphaned_files,
                            errors = report.errors,
                            "Upload sweep finished"
                        );
                    }
                    Ok(_) => debug!("Upload sweep found nothing to remove"),
                    Err(e) => error!("Upload sweep panicked: {}", e),
                }
            }
        }
    }

    info!("Upload sweeper stopped");
}
