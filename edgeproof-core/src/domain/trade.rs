//! TradeRecord: a closed trade with its realized outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FeatureError;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

/// Asset class of the traded instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Equity,
    Option,
    Crypto,
    Future,
    Forex,
    Other,
}

impl AssetClass {
    /// Stable numeric code used by the feature schema.
    pub fn code(self) -> f64 {
        match self {
            AssetClass::Equity => 0.0,
            AssetClass::Option => 1.0,
            AssetClass::Crypto => 2.0,
            AssetClass::Future => 3.0,
            AssetClass::Forex => 4.0,
            AssetClass::Other => 5.0,
        }
    }

    /// Parse a provider-supplied label. Unknown labels map to `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "equity" | "stock" | "stocks" | "etf" => AssetClass::Equity,
            "option" | "options" => AssetClass::Option,
            "crypto" | "cryptocurrency" => AssetClass::Crypto,
            "future" | "futures" => AssetClass::Future,
            "forex" | "fx" => AssetClass::Forex,
            _ => AssetClass::Other,
        }
    }
}

/// A closed trade as supplied by the trade history provider.
///
/// `return_pct` is expressed in percent (2.5 means +2.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub algorithm: String,
    pub symbol: String,
    pub asset_class: AssetClass,
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub return_pct: f64,
    pub position_size: f64,
    pub signal_strength: f64,
}

impl TradeRecord {
    /// Check the record invariants: exit after entry, finite numeric fields.
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.algorithm.trim().is_empty() {
            return Err(FeatureError::MissingField {
                field: "algorithm",
                symbol: self.symbol.clone(),
            });
        }
        if self.exit_time <= self.entry_time {
            return Err(FeatureError::NonPositiveHolding {
                symbol: self.symbol.clone(),
                entry: self.entry_time,
                exit: self.exit_time,
            });
        }
        for (field, value) in [
            ("return_pct", self.return_pct),
            ("position_size", self.position_size),
            ("signal_strength", self.signal_strength),
        ] {
            if !value.is_finite() {
                return Err(FeatureError::NonFinite {
                    field,
                    symbol: self.symbol.clone(),
                });
            }
        }
        Ok(())
    }

    /// Realized return as a fraction (0.025 for +2.5%).
    pub fn fractional_return(&self) -> f64 {
        self.return_pct / 100.0
    }

    pub fn is_win(&self) -> bool {
        self.return_pct > 0.0
    }

    /// Holding period in fractional days.
    pub fn holding_days(&self) -> f64 {
        (self.exit_time - self.entry_time).num_seconds() as f64 / 86_400.0
    }
}
