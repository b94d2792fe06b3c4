//! Per-symbol order book state and CDC derivation

use crate::codec::wire::{LevelIter, SnapshotView};
use crate::config::DepthConfig;
use crate::error::ProcessError;
use crate::types::{BookSnapshot, CdcEvent, CdcEventKind, PriceLevel, Side};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Order book state for a single symbol
///
/// Each accepted snapshot rebuilds the current state from scratch; the state
/// it replaces is kept as `previous` so level deltas can be derived by
/// diffing two complete snapshots.
#[derive(Debug)]
pub struct BookState {
    symbol: String,
    config: DepthConfig,
    exchange_name: String,
    current: BookSnapshot,
    previous: BookSnapshot,
    message_count: u64,
    initialised: bool,
    stale_sequences: u64,
    truncated_snapshots: u64,
}

impl BookState {
    /// Create the state for a symbol
    #[must_use]
    pub fn new(symbol: impl Into<String>, config: DepthConfig, exchange_name: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self {
            current: BookSnapshot::new(symbol.clone()),
            previous: BookSnapshot::new(symbol.clone()),
            symbol,
            config,
            exchange_name: exchange_name.into(),
            message_count: 0,
            initialised: false,
            stale_sequences: 0,
            truncated_snapshots: 0,
        }
    }

    /// Apply a decoded snapshot and return the CDC events it produced
    ///
    /// The first snapshot of a symbol initialises state and produces no
    /// events; afterwards events are derived by diffing the previous and new
    /// snapshots, bid removals first, then bid adds/modifies, then the same
    /// for asks.
    pub fn process_snapshot(
        &mut self,
        snapshot: &SnapshotView<'_>,
    ) -> Result<Vec<CdcEvent>, ProcessError> {
        if snapshot.symbol() != self.symbol {
            return Err(ProcessError::SymbolMismatch {
                expected: self.symbol.clone(),
                actual: snapshot.symbol().to_string(),
            });
        }

        let was_initialised = self.initialised;
        if was_initialised && snapshot.seq() <= self.current.sequence {
            warn!(
                symbol = %self.symbol,
                sequence = snapshot.seq(),
                current = self.current.sequence,
                "sequence did not advance"
            );
            self.stale_sequences += 1;
        }

        let mut next = BookSnapshot::new(self.symbol.clone());
        next.sequence = snapshot.seq();
        next.timestamp_us = ingest_timestamp_us();
        next.last_trade_price = snapshot.recent_trade_price();
        next.last_trade_quantity = snapshot.recent_trade_qty();

        let mut truncated = self.collect_side(snapshot.buy_side(), &mut next.bid_levels);
        truncated |= self.collect_side(snapshot.sell_side(), &mut next.ask_levels);
        if truncated {
            debug!(
                symbol = %self.symbol,
                max_levels = self.config.max_price_levels,
                "input exceeded per-side level cap, excess truncated"
            );
            self.truncated_snapshots += 1;
        }

        self.previous = std::mem::replace(&mut self.current, next);
        self.message_count += 1;

        let events = if was_initialised && self.config.enable_cdc {
            self.diff_events()
        } else {
            Vec::new()
        };

        if !self.initialised {
            self.initialised = true;
            debug!(
                symbol = %self.symbol,
                bids = self.current.bid_levels.len(),
                asks = self.current.ask_levels.len(),
                "book state initialised"
            );
        }

        Ok(events)
    }

    /// Current normalised snapshot
    #[must_use]
    pub const fn current_snapshot(&self) -> &BookSnapshot {
        &self.current
    }

    /// Symbol this state tracks
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Snapshots applied so far
    #[must_use]
    pub const fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Sequence of the current snapshot
    #[must_use]
    pub const fn last_sequence(&self) -> u64 {
        self.current.sequence
    }

    /// Whether at least one snapshot has been applied
    #[must_use]
    pub const fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Snapshots observed with a non-advancing sequence
    #[must_use]
    pub const fn stale_sequences(&self) -> u64 {
        self.stale_sequences
    }

    /// Snapshots whose input exceeded the per-side level cap
    #[must_use]
    pub const fn truncated_snapshots(&self) -> u64 {
        self.truncated_snapshots
    }

    fn collect_side(&self, levels: LevelIter<'_>, out: &mut BTreeMap<u64, PriceLevel>) -> bool {
        let max_levels = self.config.max_price_levels as usize;
        let mut truncated = false;
        for (index, level) in levels.enumerate() {
            if index >= max_levels {
                truncated = true;
                break;
            }
            let price = level.price();
            if price == 0 {
                debug!(symbol = %self.symbol, "skipping zero-priced level");
                continue;
            }
            let mut quantity = 0_u64;
            let mut number_of_orders = 0_u32;
            for qty in level.order_qtys() {
                quantity = quantity.saturating_add(qty);
                number_of_orders += 1;
            }
            out.insert(
                price,
                PriceLevel::new(price, quantity, number_of_orders, &self.exchange_name),
            );
        }
        truncated
    }

    fn diff_events(&self) -> Vec<CdcEvent> {
        let mut events = Vec::new();
        self.diff_side(
            &self.previous.bid_levels,
            &self.current.bid_levels,
            Side::Buy,
            &mut events,
        );
        self.diff_side(
            &self.previous.ask_levels,
            &self.current.ask_levels,
            Side::Sell,
            &mut events,
        );
        events
    }

    fn diff_side(
        &self,
        old: &BTreeMap<u64, PriceLevel>,
        new: &BTreeMap<u64, PriceLevel>,
        side: Side,
        events: &mut Vec<CdcEvent>,
    ) {
        for (price, level) in side_ordered(old, side) {
            if !new.contains_key(price) {
                events.push(self.event(CdcEventKind::LevelRemoved, side, level.clone()));
            }
        }
        for (price, level) in side_ordered(new, side) {
            match old.get(price) {
                None => events.push(self.event(CdcEventKind::LevelAdded, side, level.clone())),
                Some(prior) if prior != level => {
                    events.push(self.event(CdcEventKind::LevelModified, side, level.clone()));
                }
                Some(_) => {}
            }
        }
    }

    fn event(&self, kind: CdcEventKind, side: Side, level: PriceLevel) -> CdcEvent {
        CdcEvent {
            symbol: self.symbol.clone(),
            side,
            kind,
            level,
            sequence: self.current.sequence,
            timestamp_us: self.current.timestamp_us,
        }
    }
}

/// Iterate a side in its natural order: descending for bids, ascending for asks
fn side_ordered<'a>(
    levels: &'a BTreeMap<u64, PriceLevel>,
    side: Side,
) -> Box<dyn Iterator<Item = (&'a u64, &'a PriceLevel)> + 'a> {
    match side {
        Side::Buy => Box::new(levels.iter().rev()),
        Side::Sell => Box::new(levels.iter()),
    }
}

fn ingest_timestamp_us() -> u64 {
    u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0)
}
