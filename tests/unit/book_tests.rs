//! Unit tests for the per-symbol book state machine

use market_depth::codec::wire::{encode_snapshot, Envelope};
use market_depth::{BookSnapshot, BookState, CdcEvent, CdcEventKind, DepthConfig, Side};
use rstest::*;

const TEST_SYMBOL: &str = "ABC";
const TEST_EXCHANGE: &str = "CXA";
const BEST_BID: u64 = 1_000_000; // 100.0000 at 4 price decimals
const BEST_ASK: u64 = 1_010_000; // 101.0000
const PRICE_STEP: u64 = 1_000;
const BID_QTY: u64 = 1_000; // 10.00 at 2 quantity decimals
const ASK_QTY: u64 = 2_000; // 20.00

fn apply(
    state: &mut BookState,
    seq: u64,
    bids: &[(u64, Vec<u64>)],
    asks: &[(u64, Vec<u64>)],
) -> Vec<CdcEvent> {
    let payload = encode_snapshot(TEST_SYMBOL, seq, 0, 0, bids, asks);
    let envelope = Envelope::parse(&payload).expect("envelope should parse");
    state
        .process_snapshot(&envelope.snapshot().expect("snapshot view"))
        .expect("snapshot should process")
}

/// Five bids descending from the best, five asks ascending from the best
fn five_deep() -> (Vec<(u64, Vec<u64>)>, Vec<(u64, Vec<u64>)>) {
    let bids = (0..5)
        .map(|i| (BEST_BID - i * PRICE_STEP, vec![BID_QTY]))
        .collect();
    let asks = (0..5)
        .map(|i| (BEST_ASK + i * PRICE_STEP, vec![ASK_QTY]))
        .collect();
    (bids, asks)
}

/// Apply the events as a patch to `previous` and return the result
fn apply_patch(previous: &BookSnapshot, events: &[CdcEvent]) -> BookSnapshot {
    let mut patched = previous.clone();
    for event in events {
        let levels = match event.side {
            Side::Buy => &mut patched.bid_levels,
            Side::Sell => &mut patched.ask_levels,
        };
        match event.kind {
            CdcEventKind::LevelRemoved => {
                levels.remove(&event.level.price);
            }
            CdcEventKind::LevelAdded | CdcEventKind::LevelModified => {
                levels.insert(event.level.price, event.level.clone());
            }
            CdcEventKind::BookCleared => levels.clear(),
        }
    }
    patched
}

#[fixture]
fn state() -> BookState {
    BookState::new(TEST_SYMBOL, DepthConfig::default(), TEST_EXCHANGE)
}

#[rstest]
fn first_snapshot_produces_no_cdc(mut state: BookState) {
    let events = apply(
        &mut state,
        1,
        &[(BEST_BID, vec![100])],
        &[(BEST_ASK, vec![50])],
    );

    assert!(events.is_empty());
    assert!(state.is_initialised());
    assert_eq!(state.last_sequence(), 1);
    assert_eq!(state.current_snapshot().bid_levels.len(), 1);
}

#[rstest]
fn sides_iterate_in_natural_order(mut state: BookState) {
    let (bids, asks) = five_deep();
    apply(&mut state, 2, &bids, &asks);

    let snapshot = state.current_snapshot();
    let bid_prices: Vec<u64> = snapshot.top_bids(5).map(|l| l.price).collect();
    let mut expected_bids: Vec<u64> = bids.iter().map(|(p, _)| *p).collect();
    expected_bids.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(bid_prices, expected_bids);

    let ask_prices: Vec<u64> = snapshot.top_asks(5).map(|l| l.price).collect();
    let mut expected_asks: Vec<u64> = asks.iter().map(|(p, _)| *p).collect();
    expected_asks.sort_unstable();
    assert_eq!(ask_prices, expected_asks);
}

#[rstest]
fn modified_best_bid_emits_one_event(mut state: BookState) {
    let (bids, asks) = five_deep();
    apply(&mut state, 2, &bids, &asks);

    let mut modified = bids.clone();
    modified[0].1 = vec![1_500]; // best bid quantity 10.00 -> 15.00
    let events = apply(&mut state, 3, &modified, &asks);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, CdcEventKind::LevelModified);
    assert_eq!(events[0].side, Side::Buy);
    assert_eq!(events[0].level.price, BEST_BID);
    assert_eq!(events[0].level.quantity, 1_500);
    assert_eq!(events[0].sequence, 3);
}

#[rstest]
fn replaced_level_emits_removal_then_addition(mut state: BookState) {
    let (bids, asks) = five_deep();
    apply(&mut state, 2, &bids, &asks);

    // Replace the lowest bid (996_000) with a new level one step below
    let lowest = BEST_BID - 4 * PRICE_STEP;
    let replacement = lowest - PRICE_STEP;
    let mut changed = bids.clone();
    changed[4] = (replacement, vec![BID_QTY]);
    let events = apply(&mut state, 3, &changed, &asks);

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, CdcEventKind::LevelRemoved);
    assert_eq!(events[0].level.price, lowest);
    assert_eq!(events[1].kind, CdcEventKind::LevelAdded);
    assert_eq!(events[1].level.price, replacement);
    assert!(events.iter().all(|e| e.side == Side::Buy));
}

#[rstest]
fn event_order_is_bid_removals_adds_then_asks(mut state: BookState) {
    apply(
        &mut state,
        1,
        &[(BEST_BID, vec![10]), (BEST_BID - PRICE_STEP, vec![10])],
        &[(BEST_ASK, vec![10]), (BEST_ASK + PRICE_STEP, vec![10])],
    );
    // Drop one level and add one level on each side
    let events = apply(
        &mut state,
        2,
        &[(BEST_BID, vec![10]), (BEST_BID - 2 * PRICE_STEP, vec![10])],
        &[(BEST_ASK, vec![10]), (BEST_ASK + 2 * PRICE_STEP, vec![10])],
    );

    let shape: Vec<(Side, CdcEventKind)> = events.iter().map(|e| (e.side, e.kind)).collect();
    assert_eq!(
        shape,
        vec![
            (Side::Buy, CdcEventKind::LevelRemoved),
            (Side::Buy, CdcEventKind::LevelAdded),
            (Side::Sell, CdcEventKind::LevelRemoved),
            (Side::Sell, CdcEventKind::LevelAdded),
        ]
    );
}

#[rstest]
fn repeated_snapshot_is_quiet(mut state: BookState) {
    let (bids, asks) = five_deep();
    apply(&mut state, 1, &bids, &asks);
    let events = apply(&mut state, 2, &bids, &asks);
    assert!(events.is_empty());
}

#[rstest]
#[case::one_level(1)]
#[case::five_levels(5)]
fn cdc_patch_reproduces_current(#[case] depth: u64) {
    let mut state = BookState::new(TEST_SYMBOL, DepthConfig::default(), TEST_EXCHANGE);
    let bids: Vec<(u64, Vec<u64>)> = (0..depth)
        .map(|i| (BEST_BID - i * PRICE_STEP, vec![BID_QTY]))
        .collect();
    let asks: Vec<(u64, Vec<u64>)> = (0..depth)
        .map(|i| (BEST_ASK + i * PRICE_STEP, vec![ASK_QTY]))
        .collect();
    apply(&mut state, 1, &bids, &asks);
    let previous = state.current_snapshot().clone();

    // Shift bids down one step, double the ask quantities, drop the last ask
    let next_bids: Vec<(u64, Vec<u64>)> = bids
        .iter()
        .map(|(p, _)| (p - PRICE_STEP, vec![BID_QTY]))
        .collect();
    let mut next_asks: Vec<(u64, Vec<u64>)> = asks
        .iter()
        .map(|(p, _)| (*p, vec![ASK_QTY, ASK_QTY]))
        .collect();
    next_asks.pop();
    let events = apply(&mut state, 2, &next_bids, &next_asks);

    let patched = apply_patch(&previous, &events);
    assert_eq!(patched.bid_levels, state.current_snapshot().bid_levels);
    assert_eq!(patched.ask_levels, state.current_snapshot().ask_levels);
}

#[rstest]
fn clearing_the_book_removes_every_level(mut state: BookState) {
    let (bids, asks) = five_deep();
    apply(&mut state, 1, &bids, &asks);
    let events = apply(&mut state, 2, &[], &[]);

    assert_eq!(events.len(), 10);
    assert!(events.iter().all(|e| e.kind == CdcEventKind::LevelRemoved));
    let patched = apply_patch(&BookSnapshot::new(TEST_SYMBOL), &events);
    assert!(patched.bid_levels.is_empty());
    assert!(state.current_snapshot().bid_levels.is_empty());
    assert!(state.current_snapshot().ask_levels.is_empty());
}

#[rstest]
fn sequence_regression_counts_but_applies(mut state: BookState) {
    apply(&mut state, 10, &[(BEST_BID, vec![10])], &[]);
    apply(&mut state, 9, &[(BEST_BID, vec![20])], &[]);

    assert_eq!(state.stale_sequences(), 1);
    assert_eq!(state.last_sequence(), 9);
    assert_eq!(
        state.current_snapshot().bid_levels[&BEST_BID].quantity,
        20
    );
}

#[rstest]
fn last_trade_fields_carry_through(mut state: BookState) {
    let payload = encode_snapshot(TEST_SYMBOL, 1, 1_005_000, 250, &[(BEST_BID, vec![10])], &[]);
    let envelope = Envelope::parse(&payload).expect("parse");
    state
        .process_snapshot(&envelope.snapshot().expect("view"))
        .expect("process");

    assert_eq!(state.current_snapshot().last_trade_price, 1_005_000);
    assert_eq!(state.current_snapshot().last_trade_quantity, 250);
}
