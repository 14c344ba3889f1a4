// =============================================================================
// Maker Strategy — per-book-update quote with inventory skew
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::types::AssetId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub markets: Vec<AssetId>,
    #[serde(default)]
    pub auto_select_top: u32,
    #[serde(default)]
    pub min_spread_bps: f64,
    #[serde(default)]
    pub spread_multiplier: f64,
    #[serde(default)]
    pub order_size_usdc: f64,
    #[serde(default)]
    pub max_orders_per_market: u32,
    #[serde(default)]
    pub inventory_skew_bps: f64,
    #[serde(default)]
    pub inventory_widen_factor: f64,
    #[serde(default)]
    pub min_order_size_usdc: f64,
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            markets: Vec::new(),
            auto_select_top: 0,
            min_spread_bps: 20.0,
            spread_multiplier: 1.5,
            order_size_usdc: 25.0,
            max_orders_per_market: 2,
            inventory_skew_bps: 30.0,
            inventory_widen_factor: 0.0,
            min_order_size_usdc: 1.0,
        }
    }
}

/// Current inventory for the asset being quoted, if known.
#[derive(Debug, Clone, Copy)]
pub struct InventoryState {
    pub net_position: f64,
    pub max_position: f64,
    pub avg_entry_price: f64,
}

/// A computed two-sided quote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub buy: f64,
    pub sell: f64,
    pub size: f64,
}

pub struct MakerStrategy {
    config: MakerConfig,
}

impl MakerStrategy {
    pub fn new(config: MakerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MakerConfig {
        &self.config
    }

    /// Compute a quote for `book`, optionally skewed by `inventory`. Returns
    /// `None` on an empty or crossed book per §4.5 step 1.
    pub fn compute_quote(&self, book: &Book, inventory: Option<InventoryState>) -> Option<Quote> {
        if !book.is_quotable() {
            return None;
        }
        let best_bid = book.best_bid()?;
        let best_ask = book.best_ask()?;

        let mut mid = (best_bid + best_ask) / 2.0;
        let market_spread_bps = (best_ask - best_bid) / mid * 10_000.0;
        let mut half_spread_bps = (self.config.min_spread_bps / 2.0)
            .max(market_spread_bps * self.config.spread_multiplier / 2.0);
        let mut size = self.config.order_size_usdc;

        if let Some(inv) = inventory {
            if inv.max_position > 0.0 {
                let r = (inv.net_position / inv.max_position).clamp(-1.0, 1.0);
                mid *= 1.0 - r * self.config.inventory_skew_bps / 10_000.0;
                half_spread_bps *= 1.0 + r.abs() * self.config.inventory_widen_factor;
                size = (size * (1.0 - 0.5 * r.abs())).max(self.config.min_order_size_usdc);
            }
        }

        let mut buy = mid - mid * half_spread_bps / 10_000.0;
        let mut sell = mid + mid * half_spread_bps / 10_000.0;
        buy = buy.max(0.01);
        sell = sell.min(0.99);

        Some(Quote { buy, sell, size })
    }

    /// If the fee rate is known, widen the quote symmetrically around its
    /// own midpoint so that `(sell-buy)/mid >= 2*feeRate/10000` — §4.9 step
    /// 2a.
    pub fn ensure_fee_covering(&self, quote: Quote, fee_rate_bps: f64) -> Quote {
        let mid = (quote.buy + quote.sell) / 2.0;
        if mid <= 0.0 {
            return quote;
        }
        let current_spread_ratio = (quote.sell - quote.buy) / mid;
        let min_ratio = 2.0 * fee_rate_bps / 10_000.0;
        if current_spread_ratio >= min_ratio {
            return quote;
        }
        let half = mid * min_ratio / 2.0;
        Quote {
            buy: (mid - half).max(0.01),
            sell: (mid + half).min(0.99),
            size: quote.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::PriceLevel;

    fn book(bid: f64, ask: f64) -> Book {
        Book {
            asset_id: "a".into(),
            market: "m".into(),
            bids: vec![PriceLevel { price: bid, size: 1.0 }],
            asks: vec![PriceLevel { price: ask, size: 1.0 }],
        }
    }

    #[test]
    fn empty_or_crossed_book_yields_no_quote() {
        let strat = MakerStrategy::new(MakerConfig::default());
        assert!(strat.compute_quote(&Book::default(), None).is_none());
        assert!(strat.compute_quote(&book(0.55, 0.50), None).is_none());
    }

    #[test]
    fn flat_inventory_is_symmetric_around_mid() {
        let strat = MakerStrategy::new(MakerConfig::default());
        let q = strat.compute_quote(&book(0.50, 0.52), None).unwrap();
        let mid = 0.51;
        assert!((mid - q.buy - (q.sell - mid)).abs() < 1e-9);
        assert!(q.buy < q.sell);
    }

    #[test]
    fn scenario_maker_inventory_skew() {
        let strat = MakerStrategy::new(MakerConfig {
            min_spread_bps: 20.0,
            spread_multiplier: 1.5,
            order_size_usdc: 25.0,
            inventory_skew_bps: 30.0,
            inventory_widen_factor: 0.0,
            ..Default::default()
        });
        let b = book(0.50, 0.52);
        let flat = strat.compute_quote(&b, None).unwrap();
        let flat_mid = (flat.buy + flat.sell) / 2.0;
        assert!((flat_mid - 0.51).abs() < 1e-9);
        let flat_spread = flat.sell - flat.buy;

        let skewed = strat
            .compute_quote(
                &b,
                Some(InventoryState {
                    net_position: 25.0,
                    max_position: 50.0,
                    avg_entry_price: 0.51,
                }),
            )
            .unwrap();
        let skewed_mid = (skewed.buy + skewed.sell) / 2.0;
        assert!(skewed_mid < flat_mid);
        assert!((skewed.sell - skewed.buy) - flat_spread >= -1e-9);
    }

    #[test]
    fn size_floors_at_min_order_size() {
        let strat = MakerStrategy::new(MakerConfig {
            order_size_usdc: 1.0,
            min_order_size_usdc: 0.9,
            ..Default::default()
        });
        let q = strat
            .compute_quote(
                &book(0.50, 0.52),
                Some(InventoryState {
                    net_position: 50.0,
                    max_position: 50.0,
                    avg_entry_price: 0.51,
                }),
            )
            .unwrap();
        assert!(q.size >= 0.9);
    }

    #[test]
    fn fee_covering_widens_when_spread_too_tight() {
        let strat = MakerStrategy::new(MakerConfig::default());
        let q = Quote { buy: 0.505, sell: 0.515, size: 10.0 }; // mid 0.51, ratio ~1.96%
        let widened = strat.ensure_fee_covering(q, 50.0); // needs >= 1% ratio -> already satisfied
        assert_eq!(widened, q);

        let tight = Quote { buy: 0.5095, sell: 0.5105, size: 10.0 }; // ratio ~0.2%
        let widened = strat.ensure_fee_covering(tight, 1000.0); // needs >= 20%
        assert!(widened.sell - widened.buy > tight.sell - tight.buy);
    }
}
