//! Core order book data types
//!
//! Prices and quantities are scaled unsigned integers throughout; the JSON
//! encoder renders them as fixed-point strings using the configured decimal
//! counts.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Buy side (bids)
    Buy,
    /// Sell side (asks)
    Sell,
}

impl Side {
    /// Wire/JSON name of the side
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "bid",
            Self::Sell => "ask",
        }
    }
}

/// CDC event kinds for level change tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CdcEventKind {
    /// A price level appeared that was not in the previous snapshot
    LevelAdded,
    /// A price level changed quantity or order count
    LevelModified,
    /// A price level from the previous snapshot is gone
    LevelRemoved,
    /// The whole book was reset
    BookCleared,
}

impl CdcEventKind {
    /// JSON `event_type` name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LevelAdded => "level_added",
            Self::LevelModified => "level_modified",
            Self::LevelRemoved => "level_removed",
            Self::BookCleared => "book_cleared",
        }
    }
}

/// One aggregated price level on one side of the book
#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    /// Price in scaled integer format
    pub price: u64,
    /// Total quantity resting at this price
    pub quantity: u64,
    /// Number of orders aggregated at this price
    pub number_of_orders: u32,
    /// Exchanges contributing to this level
    pub exchanges: Vec<String>,
}

impl PriceLevel {
    /// Build a level with the given exchange attribution
    #[must_use]
    pub fn new(price: u64, quantity: u64, number_of_orders: u32, exchange: &str) -> Self {
        Self {
            price,
            quantity,
            number_of_orders,
            exchanges: vec![exchange.to_string()],
        }
    }
}

// Level identity for diffing covers price, quantity and order count only;
// exchange attribution does not make two levels different.
impl PartialEq for PriceLevel {
    fn eq(&self, other: &Self) -> bool {
        self.price == other.price
            && self.quantity == other.quantity
            && self.number_of_orders == other.number_of_orders
    }
}

impl Eq for PriceLevel {}

/// One level delta between successive snapshots of the same symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdcEvent {
    /// Symbol the change belongs to
    pub symbol: String,
    /// Side of the changed level
    pub side: Side,
    /// What happened to the level
    pub kind: CdcEventKind,
    /// Level at the new state for adds/modifies, at the prior state for removals
    pub level: PriceLevel,
    /// Sequence number of the snapshot that produced the change
    pub sequence: u64,
    /// Ingest timestamp in microseconds
    pub timestamp_us: u64,
}

/// Normalised order book state for one symbol at one sequence
///
/// `bid_levels` iterates ascending by key like any `BTreeMap`; the accessors
/// below give the side-natural orders (bids descending, asks ascending).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookSnapshot {
    /// Symbol this snapshot belongs to
    pub symbol: String,
    /// Sequence number of the producing message
    pub sequence: u64,
    /// Ingest timestamp in microseconds
    pub timestamp_us: u64,
    /// Buy side levels keyed by price
    pub bid_levels: BTreeMap<u64, PriceLevel>,
    /// Sell side levels keyed by price
    pub ask_levels: BTreeMap<u64, PriceLevel>,
    /// Most recent trade price, 0 when unknown
    pub last_trade_price: u64,
    /// Most recent trade quantity
    pub last_trade_quantity: u64,
}

impl BookSnapshot {
    /// Empty snapshot for a symbol
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Top `depth` bid levels, best (highest price) first
    pub fn top_bids(&self, depth: usize) -> impl Iterator<Item = &PriceLevel> {
        self.bid_levels.values().rev().take(depth)
    }

    /// Top `depth` ask levels, best (lowest price) first
    pub fn top_asks(&self, depth: usize) -> impl Iterator<Item = &PriceLevel> {
        self.ask_levels.values().take(depth)
    }

    /// Best bid, if any
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bid_levels.values().next_back()
    }

    /// Best ask, if any
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.ask_levels.values().next()
    }

    /// Whether both sides carry at least `depth` levels
    #[must_use]
    pub fn has_depth(&self, depth: usize) -> bool {
        self.bid_levels.len() >= depth && self.ask_levels.len() >= depth
    }
}

/// Aggregate processing statistics maintained by the book registry
#[derive(Debug, Clone, Default)]
pub struct ProcessingStats {
    /// Snapshots successfully applied
    pub messages_processed: u64,
    /// CDC events derived across all symbols
    pub cdc_events_generated: u64,
    /// Snapshots rejected by a book state
    pub processing_errors: u64,
    /// Snapshots whose sequence did not advance
    pub stale_sequences_observed: u64,
    /// Snapshots whose level count exceeded the per-side cap
    pub truncated_snapshots: u64,
    /// Highest sequence applied across all symbols
    pub last_sequence_processed: u64,
    /// Applied snapshot count per symbol
    pub symbol_message_counts: FxHashMap<String, u64>,
    /// Last applied sequence per symbol
    pub symbol_last_sequence: FxHashMap<String, u64>,
}

impl ProcessingStats {
    /// Record a successfully applied snapshot
    pub fn record_processed(&mut self, symbol: &str, sequence: u64) {
        self.messages_processed += 1;
        *self
            .symbol_message_counts
            .entry(symbol.to_string())
            .or_insert(0) += 1;
        if sequence > 0 {
            self.symbol_last_sequence
                .insert(symbol.to_string(), sequence);
            self.last_sequence_processed = self.last_sequence_processed.max(sequence);
        }
    }

    /// Symbols sorted by applied message count, busiest first
    #[must_use]
    pub fn busiest_symbols(&self, limit: usize) -> Vec<(String, u64)> {
        let mut counts: Vec<_> = self
            .symbol_message_counts
            .iter()
            .map(|(symbol, count)| (symbol.clone(), *count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(limit);
        counts
    }
}
