//! Pull the regulatory feed, expire stale restrictions and revalidate open
//! missions whenever the zone set changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use dockroute_feed::FeedClient;

use crate::backoff::Backoff;
use crate::config::Config;
use crate::state::AppState;

const MAX_FEED_BACKOFF_SECS: u64 = 600;

/// Start the feed sync loop.
pub async fn run_feed_sync_loop(state: Arc<AppState>, config: Config) {
    let client = match config.feed_url.as_deref() {
        Some(url) => match FeedClient::new(url, Duration::from_secs(config.feed_timeout_secs)) {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::error!("Feed client setup failed, feed sync disabled: {:#}", err);
                None
            }
        },
        None => {
            tracing::info!("DOCKROUTE_FEED_URL not set, only expiring stored restrictions");
            None
        }
    };

    let period = Duration::from_secs(config.feed_interval_secs);
    let mut ticker = interval(period);
    let mut backoff = Backoff::new(period, Duration::from_secs(MAX_FEED_BACKOFF_SECS).max(period));

    loop {
        ticker.tick().await;
        let mut changed = !state.expire_stale_zones().await.is_empty();

        if let Some(client) = &client {
            if backoff.ready() {
                match client.fetch_zones().await {
                    Ok(batch) => {
                        backoff.reset();
                        let report = state.apply_feed_batch(batch).await;
                        changed |= !report.accepted.is_empty();
                    }
                    Err(err) => {
                        let delay = backoff.fail();
                        tracing::warn!(
                            url = client.url(),
                            retry_in_ms = delay.as_millis() as u64,
                            "Feed sync failed: {:#}",
                            err
                        );
                    }
                }
            }
        }

        if changed {
            revalidate_open_missions(state.clone()).await;
        }
    }
}

async fn revalidate_open_missions(state: Arc<AppState>) {
    let result = tokio::task::spawn_blocking(move || {
        let planner = state.planner();
        let missions = planner.list_missions();
        for mission in &missions {
            if let Err(err) = planner.revalidate_mission(&mission.id) {
                tracing::warn!(
                    mission_id = %mission.id,
                    "Revalidation after zone change failed: {}",
                    err
                );
            }
        }
        missions.len()
    })
    .await;

    match result {
        Ok(count) => tracing::debug!(missions = count, "Open missions revalidated"),
        Err(err) => tracing::error!("Revalidation task failed: {}", err),
    }
}
