//! Wire decoding and JSON encoding

pub mod json;
pub mod wire;

pub use json::JsonEncoder;
pub use wire::{Envelope, LevelIter, LevelView, SnapshotView, MSG_ORDER_BOOK_SNAPSHOT};
