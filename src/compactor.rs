use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::engine::{Engine, EngineError};

/// How often the compactor wakes up to check the WAL.
pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact when at least `threshold` events were appended since the last compaction.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appended = engine.wal_appends_since_compact().await;
    if appended < threshold {
        return Ok(false);
    }
    info!("compacting WAL after {appended} appends");
    engine.compact_wal().await?;
    Ok(true)
}

/// Background housekeeping: WAL compaction plus pruning of abandoned notify channels.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&engine, threshold).await {
            error!("WAL compaction failed: {e}");
        }
        engine.notify.prune();
        debug!("notify channels: {}", engine.notify.channel_count());
    }
}
