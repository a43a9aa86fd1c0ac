use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::engine::Engine;

const COMPACT_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// Compact if at least `threshold` appends landed since the last compaction.
pub(crate) async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => true,
        Err(e) => {
            warn!("compaction after {appends} appends failed: {e}");
            false
        }
    }
}
