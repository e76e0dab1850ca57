use crate::config::StorageConfig;
use crate::store::StoreAdapter;

pub const TABLE_NAME: &str = "logs";

/// Owns the canonical DDL for the `logs` table: columns, codec, partition
/// cadence, sort order, materialized columns and index hints, tiered TTL.
pub struct SchemaManager<'a> {
    store: &'a dyn StoreAdapter,
    config: StorageConfig,
    database: String,
}

impl<'a> SchemaManager<'a> {
    pub fn new(store: &'a dyn StoreAdapter, config: StorageConfig, database: String) -> Self {
        Self { store, config, database }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        let ddl = self.build_ddl();
        tracing::info!("schema manager: applying DDL for {}.{TABLE_NAME}", self.database);
        self.store.exec(&ddl).await?;
        Ok(())
    }

    fn build_ddl(&self) -> String {
        let codec = match self.config.compression_codec {
            crate::config::CompressionCodec::LZ4 => "LZ4".to_string(),
            crate::config::CompressionCodec::LZ4HC => {
                format!("LZ4HC({})", self.config.compression_level)
            }
            crate::config::CompressionCodec::ZSTD => {
                format!("ZSTD({})", self.config.compression_level)
            }
        };
        let partition_expr = self.config.partition_type.partition_expr("timestamp");
        let level_numeric = level_numeric_case_expr("level");
        let db = &self.database;

        format!(
            "CREATE TABLE IF NOT EXISTS {db}.{TABLE_NAME} (\n\
                id UUID,\n\
                timestamp DateTime64(3) CODEC({codec}),\n\
                level LowCardinality(String) CODEC({codec}),\n\
                level_numeric UInt8 MATERIALIZED {level_numeric},\n\
                message String CODEC({codec}),\n\
                service LowCardinality(String) CODEC({codec}),\n\
                trace_id String CODEC({codec}),\n\
                span_id String CODEC({codec}),\n\
                attributes Map(String, String) CODEC({codec}),\n\
                date_partition Date MATERIALIZED toDate(timestamp),\n\
                hour_partition UInt8 MATERIALIZED toHour(timestamp),\n\
                INDEX idx_service service TYPE set(100) GRANULARITY 4,\n\
                INDEX idx_level level TYPE set(8) GRANULARITY 4,\n\
                INDEX idx_trace trace_id TYPE bloom_filter GRANULARITY 4,\n\
                INDEX idx_message message TYPE tokenbf_v1(32768, 3, 0) GRANULARITY 4\n\
            ) ENGINE = MergeTree\n\
            PARTITION BY {partition_expr}\n\
            ORDER BY (service, level_numeric, timestamp)\n\
            TTL toDateTime(timestamp) + INTERVAL {hot} DAY TO VOLUME 'cold',\n\
                toDateTime(timestamp) + INTERVAL {archive} DAY DELETE\n\
            SETTINGS index_granularity = 8192",
            hot = self.config.hot_ttl_days,
            archive = self.config.archive_ttl_days,
        )
    }
}

/// Shared definition of the level ordering, used both in the materialized
/// column DDL above and by the rewriter when it needs to reference severity
/// numerically.
pub fn level_numeric_case_expr(column: &str) -> String {
    format!(
        "multiIf({column} = 'fatal', 5, {column} = 'error', 4, {column} = 'warn', 3, \
         {column} = 'info', 2, {column} = 'debug', 1, 0)"
    )
}
