use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that rewrites a tenant's WAL once enough appends pile up
/// since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {
                let appends = engine.wal_appends_since_compact().await;
                if appends < threshold {
                    continue;
                }
                match engine.compact_wal().await {
                    Ok(()) => info!(
                        site = engine.site_id(),
                        "compacted WAL after {appends} appends"
                    ),
                    Err(e) => tracing::warn!(
                        site = engine.site_id(),
                        "WAL compaction failed: {e}"
                    ),
                }
            }
        }
    }
}
