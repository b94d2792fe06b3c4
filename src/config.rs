//! Service configuration
//!
//! Defaults mirror the production deployment; every option can be overridden
//! from a config file or `MARKET_DEPTH`-prefixed environment variables.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Largest decimal count the u64 scale factor supports (10^20 overflows)
const MAX_RENDER_DECIMALS: u32 = 19;

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Pipeline and bus options
    pub processor: ProcessorConfig,
    /// Order book depth options
    pub depth_config: DepthConfig,
    /// JSON formatting options
    pub json_config: JsonConfig,
    /// Topic routing options
    pub topic_config: TopicConfig,
}

/// Pipeline and bus options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Topic the consumer subscribes to
    pub input_topic: String,
    /// Consumer poll timeout in milliseconds
    pub poll_timeout_ms: u64,
    /// Producer flush cadence in milliseconds
    pub flush_interval_ms: u64,
    /// Statistics report cadence in seconds
    pub stats_interval_s: u64,
    /// Number of processing workers; symbols are shard-pinned so a given
    /// symbol is always handled by the same worker
    pub worker_count: usize,
    /// Capacity of each worker's dispatch queue
    pub queue_capacity: usize,
    /// In-process bus channel capacity
    pub bus_capacity: usize,
    /// Hard runtime cap in seconds, 0 = unlimited
    pub max_runtime_seconds: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            input_topic: "market_depth_input".to_string(),
            poll_timeout_ms: 100,
            flush_interval_ms: 1000,
            stats_interval_s: 30,
            worker_count: 1,
            queue_capacity: 10_000,
            bus_capacity: 10_000,
            max_runtime_seconds: 0,
        }
    }
}

/// Order book depth options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    /// Depth levels to publish, e.g. `[5, 10, 25, 50]`
    pub levels: Vec<u32>,
    /// Emit per-level CDC events
    pub enable_cdc: bool,
    /// Emit depth-limited snapshot projections
    pub enable_snapshots: bool,
    /// Maximum levels tracked per side; excess input levels are truncated
    pub max_price_levels: u32,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            levels: vec![5, 10, 25, 50],
            enable_cdc: true,
            enable_snapshots: true,
            max_price_levels: 100,
        }
    }
}

/// JSON formatting options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonConfig {
    /// Decimal places when rendering scaled prices
    pub price_decimals: u32,
    /// Decimal places when rendering scaled quantities
    pub quantity_decimals: u32,
    /// Include `timestamp` and `timestamp_iso` fields
    pub include_timestamp: bool,
    /// Include the `sequence` field
    pub include_sequence: bool,
    /// Emit single-line JSON instead of indented
    pub compact_format: bool,
    /// Exchange attributed to levels without their own attribution
    pub exchange_name: String,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            price_decimals: 4,
            quantity_decimals: 2,
            include_timestamp: true,
            include_sequence: true,
            compact_format: false,
            exchange_name: "CXA".to_string(),
        }
    }
}

/// Topic routing options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Prefix for snapshot topics; completed with the depth or the symbol
    /// depending on `use_depth_in_topic`
    pub snapshot_topic_prefix: String,
    /// Topic CDC events are published to
    pub cdc_topic: String,
    /// true: `prefix + depth` topics shared by all symbols;
    /// false: `prefix + symbol` topics shared by all depths
    pub use_depth_in_topic: bool,
    /// Partition by a stable symbol hash instead of letting the bus assign
    pub use_symbol_partitioning: bool,
    /// Partition count of the destination topics
    pub num_partitions: u32,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            snapshot_topic_prefix: "market_depth_snapshot_".to_string(),
            cdc_topic: "market_depth_cdc".to_string(),
            use_depth_in_topic: true,
            use_symbol_partitioning: true,
            num_partitions: 16,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a file (optional) layered with
    /// `MARKET_DEPTH`-prefixed environment variables, then validate.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("MARKET_DEPTH").separator("__"))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let loaded: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processor.input_topic.is_empty() {
            return Err(ConfigError::EmptyField {
                field: "processor.input_topic",
            });
        }
        if self.processor.poll_timeout_ms == 0 {
            return Err(ConfigError::NotPositive {
                field: "processor.poll_timeout_ms",
            });
        }
        if self.processor.flush_interval_ms == 0 {
            return Err(ConfigError::NotPositive {
                field: "processor.flush_interval_ms",
            });
        }
        if self.processor.stats_interval_s == 0 {
            return Err(ConfigError::NotPositive {
                field: "processor.stats_interval_s",
            });
        }
        if self.processor.worker_count == 0 {
            return Err(ConfigError::NotPositive {
                field: "processor.worker_count",
            });
        }
        if self.processor.queue_capacity == 0 {
            return Err(ConfigError::NotPositive {
                field: "processor.queue_capacity",
            });
        }
        if self.processor.bus_capacity == 0 {
            return Err(ConfigError::NotPositive {
                field: "processor.bus_capacity",
            });
        }
        if self.depth_config.levels.is_empty() {
            return Err(ConfigError::EmptyField {
                field: "depth_config.levels",
            });
        }
        if self.depth_config.levels.contains(&0) {
            return Err(ConfigError::NotPositive {
                field: "depth_config.levels",
            });
        }
        if self.depth_config.max_price_levels == 0 {
            return Err(ConfigError::NotPositive {
                field: "depth_config.max_price_levels",
            });
        }
        if self.json_config.price_decimals > MAX_RENDER_DECIMALS {
            return Err(ConfigError::TooLarge {
                field: "json_config.price_decimals",
                max: u64::from(MAX_RENDER_DECIMALS),
            });
        }
        if self.json_config.quantity_decimals > MAX_RENDER_DECIMALS {
            return Err(ConfigError::TooLarge {
                field: "json_config.quantity_decimals",
                max: u64::from(MAX_RENDER_DECIMALS),
            });
        }
        if self.topic_config.num_partitions == 0 {
            return Err(ConfigError::NotPositive {
                field: "topic_config.num_partitions",
            });
        }
        if self.depth_config.enable_snapshots && self.topic_config.snapshot_topic_prefix.is_empty()
        {
            return Err(ConfigError::EmptyField {
                field: "topic_config.snapshot_topic_prefix",
            });
        }
        if self.depth_config.enable_cdc && self.topic_config.cdc_topic.is_empty() {
            return Err(ConfigError::EmptyField {
                field: "topic_config.cdc_topic",
            });
        }
        Ok(())
    }
}
