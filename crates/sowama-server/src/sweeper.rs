use std::time::Duration;

use tracing::{info, warn};

use sowama_engine::ClaimMachine;

/// Background task that drives claims the user is no longer watching.
///
/// Each tick polls the chain for every `minting` session and expires
/// `checking` and unsubmitted `minting` sessions orphaned by a restart.
pub async fn run_claim_sweeper(claims: ClaimMachine, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match claims.confirm_pending_mints().await {
            Ok(count) if count > 0 => info!("Sweeper: {} mints confirmed", count),
            Ok(_) => {}
            Err(e) => warn!("Sweeper mint poll error: {}", e),
        }

        match claims.expire_stale_checks().await {
            Ok(count) if count > 0 => info!("Sweeper: expired {} stale checks", count),
            Ok(_) => {}
            Err(e) => warn!("Sweeper expiry error: {}", e),
        }

        match claims.expire_stalled_submissions().await {
            Ok(count) if count > 0 => info!("Sweeper: expired {} stalled mint submissions", count),
            Ok(_) => {}
            Err(e) => warn!("Sweeper submission expiry error: {}", e),
        }
    }
}
