//! Background ingestion schedule — runs the pipeline for configured
//! mailboxes on a fixed interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ScheduleConfig;
use crate::error::{MailError, PipelineError};
use crate::identity::Actor;
use crate::pipeline::ingest::Ingestor;

/// Spawn a background task that ingests each configured user's mailbox on
/// an interval.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_ingest_loop(
    config: ScheduleConfig,
    ingestor: Arc<Ingestor>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Ingest schedule started — every {}s for {} user(s)",
            config.interval_secs,
            config.users.len()
        );

        let mut tick = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Ingest schedule shutting down");
                return;
            }

            for user_id in &config.users {
                run_once(&ingestor, user_id).await;
            }
        }
    });

    (handle, shutdown_flag)
}

/// One scheduled pass for one user. Failures are logged, never fatal to the
/// loop.
async fn run_once(ingestor: &Ingestor, user_id: &str) {
    let actor = Actor::service(user_id);
    match ingestor.ingest(&actor).await {
        Ok(report) => {
            if report.stored > 0 {
                info!("Scheduled ingest for {user_id} stored {} lead(s)", report.stored);
            } else {
                debug!("Scheduled ingest for {user_id}: nothing new");
            }
        }
        Err(PipelineError::IngestInProgress { .. }) => {
            debug!("Skipping {user_id}: previous ingest still running");
        }
        Err(PipelineError::Mail(MailError::AuthExpired { .. })) => {
            warn!("Scheduled ingest for {user_id} needs re-authorization");
        }
        Err(e) => {
            error!("Scheduled ingest for {user_id} failed: {e}");
        }
    }
}
