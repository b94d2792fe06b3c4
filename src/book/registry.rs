//! Concurrent symbol → book state registry

use crate::book::state::BookState;
use crate::codec::wire::SnapshotView;
use crate::config::DepthConfig;
use crate::error::ProcessError;
use crate::types::{BookSnapshot, CdcEvent, ProcessingStats};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// Result of applying one snapshot through the registry
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Copy of the updated snapshot, safe to encode outside the symbol lock
    pub snapshot: BookSnapshot,
    /// CDC events derived from the update
    pub events: Vec<CdcEvent>,
}

/// Thread-safe mapping from symbol to book state
///
/// Lookups take the shared lock; creation upgrades to the exclusive lock with
/// a double check. The per-symbol mutex carries the single-writer discipline:
/// the pipeline pins each symbol to one worker, so the lock is uncontended on
/// the hot path.
pub struct BookRegistry {
    config: DepthConfig,
    exchange_name: String,
    books: RwLock<FxHashMap<String, Arc<Mutex<BookState>>>>,
    stats: Mutex<ProcessingStats>,
}

impl BookRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: DepthConfig, exchange_name: impl Into<String>) -> Self {
        Self {
            config,
            exchange_name: exchange_name.into(),
            books: RwLock::new(FxHashMap::default()),
            stats: Mutex::new(ProcessingStats::default()),
        }
    }

    /// Book state for a symbol, created lazily on first observation
    pub fn get_or_create(&self, symbol: &str) -> Arc<Mutex<BookState>> {
        {
            let books = self.books.read();
            if let Some(book) = books.get(symbol) {
                return Arc::clone(book);
            }
        }

        let mut books = self.books.write();
        if let Some(book) = books.get(symbol) {
            return Arc::clone(book);
        }
        let book = Arc::new(Mutex::new(BookState::new(
            symbol,
            self.config.clone(),
            self.exchange_name.clone(),
        )));
        books.insert(symbol.to_string(), Arc::clone(&book));
        debug!(symbol, "created book state");
        book
    }

    /// Route a decoded snapshot to its book state and roll up statistics
    pub fn process_snapshot(
        &self,
        snapshot: &SnapshotView<'_>,
    ) -> Result<ProcessOutcome, ProcessError> {
        let symbol = snapshot.symbol();
        let book = self.get_or_create(symbol);
        let mut state = book.lock();

        let stale_before = state.stale_sequences();
        let truncated_before = state.truncated_snapshots();
        let result = state.process_snapshot(snapshot);

        let mut stats = self.stats.lock();
        stats.stale_sequences_observed += state.stale_sequences() - stale_before;
        stats.truncated_snapshots += state.truncated_snapshots() - truncated_before;
        match result {
            Ok(events) => {
                stats.record_processed(symbol, snapshot.seq());
                stats.cdc_events_generated += events.len() as u64;
                drop(stats);
                Ok(ProcessOutcome {
                    snapshot: state.current_snapshot().clone(),
                    events,
                })
            }
            Err(err) => {
                stats.processing_errors += 1;
                Err(err)
            }
        }
    }

    /// Symbols currently tracked
    #[must_use]
    pub fn tracked_symbols(&self) -> Vec<String> {
        self.books.read().keys().cloned().collect()
    }

    /// Number of symbols currently tracked
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.books.read().len()
    }

    /// Copy of the aggregate processing statistics
    #[must_use]
    pub fn aggregate_stats(&self) -> ProcessingStats {
        self.stats.lock().clone()
    }
}
