// =============================================================================
// Shared types used across the convergence engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Identifier of one outcome token (a CLOB "asset" / "token id").
pub type AssetId = String;

/// Identifier of a binary market (the `conditionId` shared by a YES/NO pair).
pub type MarketId = String;

/// Which side of a trade or quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order status as reported by the venue (or synthesized by the paper
/// simulator). Transitions are monotonic toward a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Live,
    Matched,
    Filled,
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "LIVE"),
            Self::Matched => write!(f, "MATCHED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Whether the engine is actively trading, paused, or killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingState {
    Running,
    Paused,
    Killed,
}

impl Default for TradingState {
    fn default() -> Self {
        Self::Paused
    }
}

impl std::fmt::Display for TradingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
            Self::Killed => write!(f, "Killed"),
        }
    }
}

/// Whether the engine places real orders against the venue or executes
/// synthetically against the paper simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Live,
    Paper,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Paper
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Paper => write!(f, "paper"),
        }
    }
}

/// Rollout phase — clamps specific config fields per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutPhase {
    Paper,
    Shadow,
    LiveSmall,
    Live,
}

impl Default for RolloutPhase {
    fn default() -> Self {
        Self::Paper
    }
}

/// Current UTC wall-clock millis. Centralized so callers don't sprinkle
/// `chrono::Utc::now()` everywhere.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Serializes a `Duration` as whole seconds, for config fields that are
/// plain numbers on the wire (e.g. `taker.cooldown`, `risk.risk_sync_interval`).
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
