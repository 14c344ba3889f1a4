// =============================================================================
// Book Snapshot — latest full order book per asset
// =============================================================================
//
// Written only by the dispatcher; read concurrently by strategies and the
// dashboard. A crossed or empty book yields "no quote" from the maker, so
// callers must handle the `None`/`Err` paths rather than assume presence.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::AssetId;

/// One level of the book: a price/size pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

/// Full book for one asset: bids descending, asks ascending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Book {
    pub asset_id: String,
    pub market: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl Book {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// `true` when both sides are present and the book is not crossed
    /// (bestAsk > bestBid).
    pub fn is_quotable(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask > bid,
            _ => false,
        }
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Sum sizes of the top `levels` bid/ask levels. Missing levels count as 0.
    pub fn depth(&self, levels: usize) -> (f64, f64) {
        let bid_sum: f64 = self.bids.iter().take(levels).map(|l| l.size).sum();
        let ask_sum: f64 = self.asks.iter().take(levels).map(|l| l.size).sum();
        (bid_sum, ask_sum)
    }
}

/// Raw book-update event as parsed off the venue's orderbook stream.
#[derive(Debug, Clone)]
pub struct BookEvent {
    pub asset_id: String,
    pub market: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Thread-safe latest-snapshot store, one entry per asset.
pub struct BookSnapshot {
    books: RwLock<HashMap<String, Book>>,
}

impl BookSnapshot {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the book for `event.asset_id` wholesale.
    pub fn update(&self, event: BookEvent) {
        let book = Book {
            asset_id: event.asset_id.clone(),
            market: event.market,
            bids: event.bids,
            asks: event.asks,
        };
        self.books.write().insert(event.asset_id, book);
    }

    pub fn get(&self, asset: &str) -> Option<Book> {
        self.books.read().get(asset).cloned()
    }

    pub fn mid(&self, asset: &str) -> anyhow::Result<f64> {
        self.get(asset)
            .and_then(|b| b.mid())
            .ok_or_else(|| anyhow::anyhow!("no book"))
    }

    pub fn depth(&self, asset: &str, levels: usize) -> (f64, f64) {
        self.get(asset)
            .map(|b| b.depth(levels))
            .unwrap_or((0.0, 0.0))
    }

    pub fn asset_ids(&self) -> Vec<String> {
        self.books.read().keys().cloned().collect()
    }
}

impl Default for BookSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse venue-wire price/size strings, dropping the sample (not the
/// stream) on failure — per §3, parsing failures must never abort the
/// caller's loop.
pub fn parse_level(price: &str, size: &str) -> Option<PriceLevel> {
    let price: f64 = price.parse().ok()?;
    let size: f64 = size.parse().ok()?;
    if size < 0.0 {
        return None;
    }
    Some(PriceLevel { price, size })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(bid: f64, ask: f64) -> Book {
        Book {
            asset_id: "a".into(),
            market: "m".into(),
            bids: vec![PriceLevel { price: bid, size: 10.0 }],
            asks: vec![PriceLevel { price: ask, size: 10.0 }],
        }
    }

    #[test]
    fn mid_is_average_of_touch() {
        assert_eq!(book(0.50, 0.52).mid(), Some(0.51));
    }

    #[test]
    fn crossed_book_is_not_quotable() {
        assert!(!book(0.55, 0.50).is_quotable());
    }

    #[test]
    fn empty_book_has_no_mid() {
        let b = Book::default();
        assert_eq!(b.mid(), None);
        assert!(!b.is_quotable());
    }

    #[test]
    fn depth_sums_top_n_and_defaults_missing_to_zero() {
        let b = Book {
            asset_id: "a".into(),
            market: "m".into(),
            bids: vec![
                PriceLevel { price: 0.50, size: 10.0 },
                PriceLevel { price: 0.49, size: 5.0 },
            ],
            asks: vec![PriceLevel { price: 0.52, size: 7.0 }],
        };
        assert_eq!(b.depth(5), (15.0, 7.0));
        assert_eq!(b.depth(1), (10.0, 7.0));
    }

    #[test]
    fn snapshot_update_then_get() {
        let snap = BookSnapshot::new();
        assert!(snap.get("a").is_none());
        snap.update(BookEvent {
            asset_id: "a".into(),
            market: "m".into(),
            bids: vec![PriceLevel { price: 0.50, size: 1.0 }],
            asks: vec![PriceLevel { price: 0.52, size: 1.0 }],
        });
        assert_eq!(snap.mid("a").unwrap(), 0.51);
        assert_eq!(snap.asset_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn mid_of_unknown_asset_is_error() {
        let snap = BookSnapshot::new();
        assert!(snap.mid("missing").is_err());
    }

    #[test]
    fn parse_level_drops_unparseable_and_negative_size() {
        assert!(parse_level("not-a-number", "1.0").is_none());
        assert!(parse_level("0.5", "-1.0").is_none());
        assert!(parse_level("0.5", "1.0").is_some());
    }
}
