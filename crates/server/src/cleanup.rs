use std::sync::Arc;
use std::time::Duration;

use provisor_state::StateStore;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Periodically purge idempotency records past their retention window until
/// `shutdown` is cancelled.
pub async fn run_retention_cleanup(
    store: Arc<dyn StateStore>,
    every: Duration,
    shutdown: CancellationToken,
) {
    if every.is_zero() {
        error!("retention cleanup interval is zero, cleanup disabled");
        return;
    }
    info!(interval_secs = every.as_secs(), "retention cleanup starting");
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; nothing has expired yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match store.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "expired idempotency records purged"),
                    Err(e) => error!(error = %e, "error purging idempotency records"),
                }
            }
        }
    }

    info!("retention cleanup stopped");
}
