//! JSON encoding of snapshots and CDC events for downstream consumers

use crate::config::JsonConfig;
use crate::types::{BookSnapshot, CdcEvent, PriceLevel, Side};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Renders internal book structures as JSON strings
#[derive(Debug, Clone)]
pub struct JsonEncoder {
    config: JsonConfig,
}

impl JsonEncoder {
    /// Create an encoder with the given formatting options
    #[must_use]
    pub const fn new(config: JsonConfig) -> Self {
        Self { config }
    }

    /// Formatting options in use
    #[must_use]
    pub const fn config(&self) -> &JsonConfig {
        &self.config
    }

    /// Render a depth-limited snapshot projection
    #[must_use]
    pub fn snapshot_to_json(&self, snapshot: &BookSnapshot, depth: u32) -> String {
        let mut root = Map::new();
        self.common_fields(
            &mut root,
            &snapshot.symbol,
            snapshot.sequence,
            snapshot.timestamp_us,
        );
        root.insert("message_type".to_string(), json!("snapshot"));
        root.insert("depth".to_string(), json!(depth));

        let bids: Vec<Value> = snapshot
            .top_bids(depth as usize)
            .map(|level| self.level_json(level, Side::Buy, &snapshot.symbol))
            .collect();
        root.insert("bids".to_string(), Value::Array(bids));

        let asks: Vec<Value> = snapshot
            .top_asks(depth as usize)
            .map(|level| self.level_json(level, Side::Sell, &snapshot.symbol))
            .collect();
        root.insert("asks".to_string(), Value::Array(asks));

        if snapshot.last_trade_price > 0 {
            root.insert(
                "last_trade".to_string(),
                json!({
                    "price": self.format_price(snapshot.last_trade_price),
                    "quantity": self.format_quantity(snapshot.last_trade_quantity),
                }),
            );
        }

        let mut stats = Map::new();
        stats.insert(
            "total_bid_levels".to_string(),
            json!(snapshot.bid_levels.len()),
        );
        stats.insert(
            "total_ask_levels".to_string(),
            json!(snapshot.ask_levels.len()),
        );
        stats.insert(
            "has_sufficient_depth".to_string(),
            json!(snapshot.has_depth(depth as usize)),
        );
        if let (Some(bid), Some(ask)) = (snapshot.best_bid(), snapshot.best_ask()) {
            // Crossed/locked books appear transiently on real feeds; clamp
            // rather than underflow.
            stats.insert(
                "spread".to_string(),
                json!(self.format_price(ask.price.saturating_sub(bid.price))),
            );
            stats.insert(
                "mid_price".to_string(),
                json!(self.format_price(ask.price.saturating_add(bid.price) / 2)),
            );
        }
        root.insert("market_stats".to_string(), Value::Object(stats));

        self.render(Value::Object(root))
    }

    /// Render a CDC event
    #[must_use]
    pub fn cdc_to_json(&self, event: &CdcEvent) -> String {
        let mut root = Map::new();
        self.common_fields(&mut root, &event.symbol, event.sequence, event.timestamp_us);
        root.insert("message_type".to_string(), json!("cdc"));
        root.insert("event_type".to_string(), json!(event.kind.as_str()));
        root.insert("side".to_string(), json!(event.side.as_str()));
        root.insert(
            "level".to_string(),
            self.level_json(&event.level, event.side, &event.symbol),
        );
        self.render(Value::Object(root))
    }

    /// Render one projection per depth level the snapshot fully covers
    ///
    /// Depths with fewer levels on either side are omitted from the result.
    #[must_use]
    pub fn multi_depth_snapshots(
        &self,
        snapshot: &BookSnapshot,
        depth_levels: &[u32],
    ) -> BTreeMap<u32, String> {
        let mut result = BTreeMap::new();
        for &depth in depth_levels {
            if snapshot.has_depth(depth as usize) {
                result.insert(depth, self.snapshot_to_json(snapshot, depth));
            } else {
                tracing::debug!(
                    symbol = %snapshot.symbol,
                    depth,
                    bid_levels = snapshot.bid_levels.len(),
                    ask_levels = snapshot.ask_levels.len(),
                    "insufficient depth, projection omitted"
                );
            }
        }
        result
    }

    fn level_json(&self, level: &PriceLevel, side: Side, symbol: &str) -> Value {
        let exchanges = if level.exchanges.is_empty() {
            vec![self.config.exchange_name.clone()]
        } else {
            level.exchanges.clone()
        };
        json!({
            "symbol": symbol,
            "side": side.as_str(),
            "price": self.format_price(level.price),
            "quantity": self.format_quantity(level.quantity),
            "number_of_orders": level.number_of_orders,
            "exchanges": exchanges,
        })
    }

    fn common_fields(
        &self,
        root: &mut Map<String, Value>,
        symbol: &str,
        sequence: u64,
        timestamp_us: u64,
    ) {
        root.insert("symbol".to_string(), json!(symbol));
        if self.config.include_sequence {
            root.insert("sequence".to_string(), json!(sequence));
        }
        if self.config.include_timestamp {
            root.insert("timestamp".to_string(), json!(timestamp_us));
            root.insert("timestamp_iso".to_string(), json!(iso_timestamp(timestamp_us)));
        }
    }

    fn format_price(&self, value: u64) -> String {
        format_scaled(value, self.config.price_decimals)
    }

    fn format_quantity(&self, value: u64) -> String {
        format_scaled(value, self.config.quantity_decimals)
    }

    fn render(&self, value: Value) -> String {
        if self.config.compact_format {
            value.to_string()
        } else {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
        }
    }
}

/// Render a scaled integer as a fixed-point decimal string
fn format_scaled(value: u64, decimals: u32) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let scale = 10_u64.pow(decimals);
    format!(
        "{}.{:0width$}",
        value / scale,
        value % scale,
        width = decimals as usize
    )
}

/// UTC ISO-8601 with millisecond precision
fn iso_timestamp(timestamp_us: u64) -> String {
    DateTime::<Utc>::from_timestamp_micros(timestamp_us as i64)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_default()
}
