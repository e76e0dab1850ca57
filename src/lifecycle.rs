use std::sync::Arc;
use std::time::Duration;

use crate::config::StorageConfig;
use crate::schema::TABLE_NAME;
use crate::store::StoreAdapter;

#[derive(Debug, Clone, serde::Serialize, Default)]
pub struct StorageStats {
    pub total_rows: u64,
    pub compressed_bytes: u64,
    pub uncompressed_bytes: u64,
    pub compression_ratio: f64,
    pub partition_count: u64,
    pub oldest_partition: Option<String>,
    pub newest_partition: Option<String>,
}

/// Periodic optimize/cleanup/stats over the `logs` table: wait for startup
/// settling, then loop on a fixed interval, logging but never failing the
/// caller on error.
pub fn spawn_lifecycle_manager(
    store: Arc<dyn StoreAdapter>,
    config: StorageConfig,
    database: String,
) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        tracing::info!(
            "lifecycle manager: started (interval={}s, hot_ttl={}d, archive_ttl={}d)",
            config.cleanup_interval_secs,
            config.hot_ttl_days,
            config.archive_ttl_days,
        );

        let mut interval = tokio::time::interval(Duration::from_secs(config.cleanup_interval_secs));
        loop {
            interval.tick().await;
            if let Err(e) = run_cycle(store.as_ref(), &config, &database).await {
                tracing::error!("lifecycle manager cycle failed: {e}");
            }
        }
    });
}

async fn run_cycle(
    store: &dyn StoreAdapter,
    config: &StorageConfig,
    database: &str,
) -> anyhow::Result<()> {
    optimize_old_partitions(store, config, database).await?;
    refresh_stats(store, database).await?;
    Ok(())
}

async fn optimize_old_partitions(
    store: &dyn StoreAdapter,
    config: &StorageConfig,
    database: &str,
) -> anyhow::Result<()> {
    let sql = format!(
        "SELECT partition FROM system.parts \
         WHERE database = '{database}' AND table = '{TABLE_NAME}' AND active \
         AND min_date < today() - {} \
         GROUP BY partition LIMIT {}",
        config.hot_ttl_days, config.batch_size,
    );
    let (_, rows) = store.query(&sql).await?;
    for row in rows {
        let Some(partition) = row.get("partition").and_then(|v| v.as_str()) else {
            continue;
        };
        let opt_sql = format!(
            "OPTIMIZE TABLE {database}.{TABLE_NAME} PARTITION '{partition}' FINAL"
        );
        if let Err(e) = store.exec(&opt_sql).await {
            tracing::warn!("lifecycle manager: optimize {partition} failed: {e}");
        }
    }
    Ok(())
}

async fn refresh_stats(store: &dyn StoreAdapter, database: &str) -> anyhow::Result<()> {
    // Touching system.parts keeps cached metadata warm; failures here are
    // non-fatal and only logged.
    let sql = format!(
        "SELECT count() FROM system.parts WHERE database = '{database}' AND table = '{TABLE_NAME}' AND active"
    );
    store.query(&sql).await?;
    Ok(())
}

pub async fn get_storage_stats(
    store: &dyn StoreAdapter,
    database: &str,
) -> anyhow::Result<StorageStats> {
    let sql = format!(
        "SELECT \
            sum(rows) as total_rows, \
            sum(data_compressed_bytes) as compressed_bytes, \
            sum(data_uncompressed_bytes) as uncompressed_bytes, \
            uniqExact(partition) as partition_count, \
            min(min_date) as oldest_partition, \
            max(max_date) as newest_partition \
         FROM system.parts \
         WHERE database = '{database}' AND table = '{TABLE_NAME}' AND active"
    );
    let (_, rows) = store.query(&sql).await?;
    let Some(row) = rows.into_iter().next() else {
        return Ok(StorageStats::default());
    };

    let total_rows = row.get("total_rows").and_then(|v| v.as_i64()).unwrap_or(0) as u64;
    let compressed_bytes = row
        .get("compressed_bytes")
        .and_then(|v| v.as_i64())
        .unwrap_or(0) as u64;
    let uncompressed_bytes = row
        .get("uncompressed_bytes")
        .and_then(|v| v.as_i64())
        .unwrap_or(0) as u64;
    let compression_ratio = if compressed_bytes > 0 {
        uncompressed_bytes as f64 / compressed_bytes as f64
    } else {
        0.0
    };

    Ok(StorageStats {
        total_rows,
        compressed_bytes,
        uncompressed_bytes,
        compression_ratio,
        partition_count: row
            .get("partition_count")
            .and_then(|v| v.as_i64())
            .unwrap_or(0) as u64,
        oldest_partition: row.get("oldest_partition").and_then(|v| v.as_str()).map(String::from),
        newest_partition: row.get("newest_partition").and_then(|v| v.as_str()).map(String::from),
    })
}
