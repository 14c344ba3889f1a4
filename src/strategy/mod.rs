// =============================================================================
// Strategy polymorphism — maker and taker share a common output shape
// =============================================================================
//
// Per §9 design notes: maker/taker are variants of `evaluate(event, deps) ->
// optional<ActionIntent>`. Tagged variants are preferred here over a trait
// object hierarchy.
// =============================================================================

pub mod maker;
pub mod taker;

use crate::types::{AssetId, Side};

/// What a strategy wants the dispatcher to do.
#[derive(Debug, Clone)]
pub enum ActionIntent {
    /// Post a two-sided passive quote.
    Quote { buy: f64, sell: f64, size: f64 },
    /// Take liquidity with a single marketable order.
    MarketOrder {
        side: Side,
        amount_usdc: f64,
        max_price: f64,
    },
    /// A two-leg order across a binary pair (used by convergence arb).
    PairOrder {
        leg1: (AssetId, Side, f64),
        leg2: (AssetId, Side, f64),
    },
}

pub use maker::{InventoryState, MakerConfig, MakerStrategy};
pub use taker::{TakerConfig, TakerStrategy};
