//! Domain types: closed trades and the contextual snapshots they are scored against.

pub mod context;
pub mod trade;

pub use context::{ContextData, ContextStore, RegimeSnapshot, SignalCount};
pub use trade::{AssetClass, Direction, TradeRecord};
