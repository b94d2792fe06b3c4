//! Order book state management

pub mod registry;
pub mod state;

pub use registry::{BookRegistry, ProcessOutcome};
pub use state::BookState;
