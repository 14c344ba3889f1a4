// =============================================================================
// Taker Strategy — composite imbalance/flow/convergence scoring
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::types::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub min_imbalance: f64,
    #[serde(default)]
    pub depth_levels: usize,
    #[serde(default)]
    pub amount_usdc: f64,
    #[serde(default)]
    pub max_slippage_bps: f64,
    #[serde(default, with = "crate::types::duration_secs")]
    pub cooldown: Duration,
    #[serde(default)]
    pub flow_weight: f64,
    #[serde(default)]
    pub imbalance_weight: f64,
    #[serde(default)]
    pub convergence_weight: f64,
    #[serde(default)]
    pub min_convergence_bps: f64,
    #[serde(default)]
    pub flow_window_secs: u64,
    #[serde(default)]
    pub min_composite_score: f64,
}

impl Default for TakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_imbalance: 0.3,
            depth_levels: 5,
            amount_usdc: 25.0,
            max_slippage_bps: 50.0,
            cooldown: Duration::from_secs(10),
            flow_weight: 0.3,
            imbalance_weight: 0.4,
            convergence_weight: 0.3,
            min_convergence_bps: 50.0,
            flow_window_secs: 120,
            min_composite_score: 0.35,
        }
    }
}

impl TakerConfig {
    pub fn flow_window(&self) -> Duration {
        Duration::from_secs(self.flow_window_secs)
    }
}

/// A taker order proposal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakerSignal {
    pub side: Side,
    pub amount_usdc: f64,
    pub max_price: f64,
}

pub struct TakerStrategy {
    config: TakerConfig,
    last_trade: RwLock<HashMap<String, i64>>,
}

impl TakerStrategy {
    pub fn new(config: TakerConfig) -> Self {
        Self {
            config,
            last_trade: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TakerConfig {
        &self.config
    }

    fn in_cooldown(&self, asset: &str, now: i64) -> bool {
        match self.last_trade.read().get(asset) {
            Some(&last) => now - last < self.config.cooldown.as_millis() as i64,
            None => false,
        }
    }

    /// Record that a trade was just placed for `asset`, starting its
    /// cooldown.
    pub fn record_trade(&self, asset: &str, now: i64) {
        self.last_trade.write().insert(asset.to_string(), now);
    }

    /// Simple top-of-book imbalance evaluation.
    pub fn evaluate(&self, asset: &str, book: &Book, now: i64) -> Option<TakerSignal> {
        if self.in_cooldown(asset, now) {
            return None;
        }
        let mid = book.mid()?;
        let (bid_depth, ask_depth) = book.depth(self.config.depth_levels);
        let total = bid_depth + ask_depth;
        if total <= 0.0 {
            return None;
        }
        let imbalance = (bid_depth - ask_depth) / total;
        if imbalance.abs() < self.config.min_imbalance {
            return None;
        }

        let side = if imbalance > 0.0 { Side::Buy } else { Side::Sell };
        let max_price = match side {
            Side::Buy => mid + mid * self.config.max_slippage_bps / 10_000.0,
            Side::Sell => (mid - mid * self.config.max_slippage_bps / 10_000.0).max(0.01),
        };

        Some(TakerSignal {
            side,
            amount_usdc: self.config.amount_usdc,
            max_price,
        })
    }

    /// Composite imbalance + flow + convergence score.
    pub fn evaluate_enhanced(
        &self,
        asset: &str,
        book: &Book,
        net_flow: f64,
        counterpart_mid: Option<f64>,
        now: i64,
    ) -> Option<TakerSignal> {
        if self.in_cooldown(asset, now) {
            return None;
        }
        let mid = book.mid()?;
        let (bid_depth, ask_depth) = book.depth(self.config.depth_levels);
        let total = bid_depth + ask_depth;
        if total <= 0.0 {
            return None;
        }
        let imbalance = (bid_depth - ask_depth) / total;

        let convergence_edge = match counterpart_mid {
            Some(cp) => (mid + cp - 1.0).abs(),
            None => 0.0,
        };

        let composite = self.config.imbalance_weight * imbalance.abs()
            + self.config.flow_weight * net_flow.abs()
            + self.config.convergence_weight * convergence_edge;

        if composite < self.config.min_composite_score {
            return None;
        }

        let buy_score = imbalance.max(0.0) + net_flow.max(0.0);
        let sell_score = (-imbalance).max(0.0) + (-net_flow).max(0.0);
        let side = if buy_score >= sell_score { Side::Buy } else { Side::Sell };

        let max_price = match side {
            Side::Buy => mid + mid * self.config.max_slippage_bps / 10_000.0,
            Side::Sell => (mid - mid * self.config.max_slippage_bps / 10_000.0).max(0.01),
        };

        let scale = (composite / 0.5).clamp(0.5, 1.5);
        let amount_usdc = self.config.amount_usdc * scale;

        Some(TakerSignal {
            side,
            amount_usdc,
            max_price,
        })
    }

    /// `edgeBps = |yes+no-1|*10000`; side is BUY-the-cheaper-leg when
    /// `sum<1`, SELL-the-pricier-leg when `sum>1`. Returns `None` below
    /// `min_convergence_bps`.
    pub fn detect_convergence(
        &self,
        yes: f64,
        no: f64,
    ) -> Option<(Side, f64)> {
        let sum = yes + no;
        let edge_bps = (sum - 1.0).abs() * 10_000.0;
        if edge_bps < self.config.min_convergence_bps {
            return None;
        }
        let side = if sum > 1.0 { Side::Sell } else { Side::Buy };
        Some((side, edge_bps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::PriceLevel;

    fn book_with_depth(bid_price: f64, ask_price: f64, bid_size: f64, ask_size: f64) -> Book {
        Book {
            asset_id: "a".into(),
            market: "m".into(),
            bids: vec![PriceLevel { price: bid_price, size: bid_size }],
            asks: vec![PriceLevel { price: ask_price, size: ask_size }],
        }
    }

    #[test]
    fn below_min_imbalance_yields_no_signal() {
        let strat = TakerStrategy::new(TakerConfig {
            min_imbalance: 0.5,
            ..Default::default()
        });
        let b = book_with_depth(0.50, 0.52, 10.0, 9.0); // imbalance ~0.05
        assert!(strat.evaluate("a", &b, 0).is_none());
    }

    #[test]
    fn cooldown_suppresses_signal() {
        let strat = TakerStrategy::new(TakerConfig {
            min_imbalance: 0.1,
            cooldown: Duration::from_secs(10),
            ..Default::default()
        });
        let b = book_with_depth(0.50, 0.52, 100.0, 1.0);
        assert!(strat.evaluate("a", &b, 0).is_some());
        strat.record_trade("a", 0);
        assert!(strat.evaluate("a", &b, 5_000).is_none());
        assert!(strat.evaluate("a", &b, 11_000).is_some());
    }

    #[test]
    fn scenario_convergence_underpricing() {
        let strat = TakerStrategy::new(TakerConfig {
            min_convergence_bps: 50.0,
            ..Default::default()
        });
        let (side, edge) = strat.detect_convergence(0.40, 0.55).unwrap();
        assert_eq!(side, Side::Buy);
        assert!((edge - 500.0).abs() < 1e-9);
    }

    #[test]
    fn convergence_below_threshold_emits_nothing() {
        let strat = TakerStrategy::new(TakerConfig {
            min_convergence_bps: 500.0,
            ..Default::default()
        });
        assert!(strat.detect_convergence(0.49, 0.50).is_none());
    }

    #[test]
    fn overpriced_pair_sells_the_expensive_leg() {
        let strat = TakerStrategy::new(TakerConfig {
            min_convergence_bps: 50.0,
            ..Default::default()
        });
        let (side, _) = strat.detect_convergence(0.60, 0.55).unwrap();
        assert_eq!(side, Side::Sell);
    }
}
