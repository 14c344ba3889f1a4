// =============================================================================
// Paper Simulator — synthesizes fills against the live book, no matching
// engine of its own
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::types::{now_millis, AssetId, OrderStatus, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default)]
    pub initial_balance_usdc: f64,
    #[serde(default)]
    pub fee_bps: f64,
    #[serde(default)]
    pub slippage_bps: f64,
    #[serde(default)]
    pub allow_short: bool,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance_usdc: 1000.0,
            fee_bps: 10.0,
            slippage_bps: 20.0,
            allow_short: false,
        }
    }
}

/// Explicit precondition failures — never panics, always returned so the
/// dispatcher can log and treat the order as not placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaperError {
    InsufficientBalance { needed: f64, available: f64 },
    InsufficientInventory { needed: f64, available: f64 },
    NoBook,
}

impl std::fmt::Display for PaperError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientBalance { needed, available } => {
                write!(f, "insufficient balance: need {needed}, have {available}")
            }
            Self::InsufficientInventory { needed, available } => {
                write!(f, "insufficient inventory: need {needed}, have {available}")
            }
            Self::NoBook => write!(f, "no book for asset"),
        }
    }
}

impl std::error::Error for PaperError {}

/// Result of a filled (or partially evaluated) paper order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperOrder {
    pub order_id: String,
    pub trade_id: Option<String>,
    pub asset_id: AssetId,
    pub side: Side,
    pub price: f64,
    pub amount_usdc: f64,
    pub filled: bool,
    pub status: OrderStatus,
}

/// Dashboard-facing snapshot of the paper account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperAccount {
    pub initial_balance_usdc: f64,
    pub balance_usdc: f64,
    pub fees_paid_usdc: f64,
    pub total_volume_usdc: f64,
    pub total_trades: u64,
    pub allow_short: bool,
    pub inventory_by_asset: HashMap<AssetId, f64>,
}

struct Inner {
    balance_usdc: f64,
    fees_paid_usdc: f64,
    total_volume_usdc: f64,
    total_trades: u64,
    inventory_by_asset: HashMap<AssetId, f64>,
}

pub struct PaperSimulator {
    config: PaperConfig,
    inner: RwLock<Inner>,
    order_counter: AtomicU64,
    trade_counter: AtomicU64,
}

impl PaperSimulator {
    pub fn new(config: PaperConfig) -> Self {
        let balance = config.initial_balance_usdc;
        Self {
            config,
            inner: RwLock::new(Inner {
                balance_usdc: balance,
                fees_paid_usdc: 0.0,
                total_volume_usdc: 0.0,
                total_trades: 0,
                inventory_by_asset: HashMap::new(),
            }),
            order_counter: AtomicU64::new(0),
            trade_counter: AtomicU64::new(0),
        }
    }

    fn next_order_id(&self) -> String {
        let n = self.order_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("paper-order-{n:06}")
    }

    fn next_trade_id(&self) -> String {
        let n = self.trade_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("paper-trade-{n:06}")
    }

    /// Execute a market order against `book`'s current touch. BUY executes
    /// at `bestAsk*(1+slippage)`, SELL at `bestBid*(1-slippage)`.
    pub fn execute_market(
        &self,
        asset: &str,
        side: Side,
        amount_usdc: f64,
        book: &Book,
    ) -> Result<PaperOrder, PaperError> {
        let touch = match side {
            Side::Buy => book.best_ask(),
            Side::Sell => book.best_bid(),
        }
        .ok_or(PaperError::NoBook)?;

        let price = match side {
            Side::Buy => touch * (1.0 + self.config.slippage_bps / 10_000.0),
            Side::Sell => touch * (1.0 - self.config.slippage_bps / 10_000.0),
        };

        let fee = amount_usdc * self.config.fee_bps / 10_000.0;
        let size = amount_usdc / price;

        let mut inner = self.inner.write();

        match side {
            Side::Buy => {
                let needed = amount_usdc + fee;
                if inner.balance_usdc < needed {
                    return Err(PaperError::InsufficientBalance {
                        needed,
                        available: inner.balance_usdc,
                    });
                }
            }
            Side::Sell => {
                if !self.config.allow_short {
                    let available = *inner.inventory_by_asset.get(asset).unwrap_or(&0.0);
                    if available < size {
                        return Err(PaperError::InsufficientInventory {
                            needed: size,
                            available,
                        });
                    }
                }
            }
        }

        let order_id = self.next_order_id();
        let trade_id = self.next_trade_id();

        match side {
            Side::Buy => {
                inner.balance_usdc -= amount_usdc + fee;
                *inner.inventory_by_asset.entry(asset.to_string()).or_insert(0.0) += size;
            }
            Side::Sell => {
                inner.balance_usdc += amount_usdc - fee;
                *inner.inventory_by_asset.entry(asset.to_string()).or_insert(0.0) -= size;
            }
        }
        inner.fees_paid_usdc += fee;
        inner.total_volume_usdc += amount_usdc;
        inner.total_trades += 1;

        Ok(PaperOrder {
            order_id,
            trade_id: Some(trade_id),
            asset_id: asset.to_string(),
            side,
            price,
            amount_usdc,
            filled: true,
            status: OrderStatus::Filled,
        })
    }

    /// Evaluate a limit order against `book`. BUY fills if `bestAsk <=
    /// limitPrice`, SELL fills if `bestBid >= limitPrice`; fill happens at
    /// the crossing touch (not the limit), with slippage then applied the
    /// same way `execute_market` does. If not crossed, returns an
    /// unfilled LIVE stub with no state change.
    pub fn execute_limit(
        &self,
        asset: &str,
        side: Side,
        limit_price: f64,
        amount_usdc: f64,
        book: &Book,
    ) -> Result<PaperOrder, PaperError> {
        let crossed = match side {
            Side::Buy => book.best_ask().map(|a| a <= limit_price).unwrap_or(false),
            Side::Sell => book.best_bid().map(|b| b >= limit_price).unwrap_or(false),
        };

        if !crossed {
            return Ok(PaperOrder {
                order_id: self.next_order_id(),
                trade_id: None,
                asset_id: asset.to_string(),
                side,
                price: limit_price,
                amount_usdc,
                filled: false,
                status: OrderStatus::Live,
            });
        }

        let mut filled = self.execute_market(asset, side, amount_usdc, book)?;
        filled.status = OrderStatus::Matched;
        Ok(filled)
    }

    pub fn snapshot(&self) -> PaperAccount {
        let inner = self.inner.read();
        PaperAccount {
            initial_balance_usdc: self.config.initial_balance_usdc,
            balance_usdc: inner.balance_usdc,
            fees_paid_usdc: inner.fees_paid_usdc,
            total_volume_usdc: inner.total_volume_usdc,
            total_trades: inner.total_trades,
            allow_short: self.config.allow_short,
            inventory_by_asset: inner.inventory_by_asset.clone(),
        }
    }

    pub fn timestamp_now(&self) -> i64 {
        now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::PriceLevel;

    fn book() -> Book {
        Book {
            asset_id: "a".into(),
            market: "m".into(),
            bids: vec![PriceLevel { price: 0.50, size: 500.0 }],
            asks: vec![PriceLevel { price: 0.52, size: 500.0 }],
        }
    }

    #[test]
    fn scenario_paper_market_buy_with_fees() {
        let sim = PaperSimulator::new(PaperConfig {
            initial_balance_usdc: 1000.0,
            fee_bps: 10.0,
            slippage_bps: 20.0,
            allow_short: false,
        });
        let order = sim.execute_market("a", Side::Buy, 100.0, &book()).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        let acct = sim.snapshot();
        assert!((acct.balance_usdc - 899.9).abs() < 1e-6);
        assert!(acct.fees_paid_usdc > 0.0);
        assert!(acct.inventory_by_asset["a"] > 0.0);
    }

    #[test]
    fn scenario_paper_limit_no_cross() {
        let sim = PaperSimulator::new(PaperConfig::default());
        let order = sim
            .execute_limit("a", Side::Buy, 0.51, 100.0, &book())
            .unwrap();
        assert_eq!(order.status, OrderStatus::Live);
        assert!(!order.filled);
        assert_eq!(order.price, 0.51);
        assert_eq!(order.amount_usdc, 100.0);
        assert_eq!(sim.snapshot().balance_usdc, 1000.0);
    }

    #[test]
    fn limit_buy_crosses_and_fills_at_touch_with_slippage() {
        let sim = PaperSimulator::new(PaperConfig::default());
        let order = sim
            .execute_limit("a", Side::Buy, 0.55, 100.0, &book())
            .unwrap();
        assert_eq!(order.status, OrderStatus::Matched);
        assert!(order.filled);
        assert!(order.price > 0.52); // touch plus slippage
    }

    #[test]
    fn market_buy_rejects_insufficient_balance() {
        let sim = PaperSimulator::new(PaperConfig {
            initial_balance_usdc: 1.0,
            ..Default::default()
        });
        let err = sim.execute_market("a", Side::Buy, 100.0, &book()).unwrap_err();
        assert!(matches!(err, PaperError::InsufficientBalance { .. }));
    }

    #[test]
    fn market_sell_without_inventory_and_no_shorting_is_rejected() {
        let sim = PaperSimulator::new(PaperConfig {
            allow_short: false,
            ..Default::default()
        });
        let err = sim.execute_market("a", Side::Sell, 100.0, &book()).unwrap_err();
        assert!(matches!(err, PaperError::InsufficientInventory { .. }));
    }

    #[test]
    fn market_sell_allows_shorting_when_configured() {
        let sim = PaperSimulator::new(PaperConfig {
            allow_short: true,
            ..Default::default()
        });
        let order = sim.execute_market("a", Side::Sell, 100.0, &book()).unwrap();
        assert!(order.filled);
        assert!(sim.snapshot().inventory_by_asset["a"] < 0.0);
    }
}
