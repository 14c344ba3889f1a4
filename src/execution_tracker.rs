// =============================================================================
// Execution Tracker — single source of truth for orders, fills, positions
// =============================================================================
//
// All mutators take the exclusive lock; reads take the shared lock. Getters
// return deep copies so dashboard readers can never alias the in-flight
// dispatcher mutation (per §9 "shared state across dashboard and trading").
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{now_millis, AssetId, MarketId, OrderStatus, Side};

/// A tracked order. Created by `register_order` (our own live orders) or as a
/// stub on arrival of an order event for an unknown id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub asset_id: AssetId,
    pub market: MarketId,
    pub side: Side,
    pub status: OrderStatus,
    pub price: f64,
    pub orig_size: f64,
    pub filled_size: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A single fill. Append-only, retained for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub trade_id: String,
    pub order_id: String,
    pub asset_id: AssetId,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub timestamp: i64,
}

/// Per-asset position reconstructed purely from fills.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Position {
    pub asset_id: AssetId,
    /// Signed size: positive = long, negative = short.
    pub net_size: f64,
    pub avg_entry_price: f64,
    pub realized_pnl: f64,
    pub total_fills: u64,
}

/// Order-state event as observed on the venue's user-order stream.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    pub id: String,
    pub asset_id: AssetId,
    pub market: MarketId,
    pub side: Side,
    pub price: f64,
    pub orig_size: f64,
    pub matched_size: f64,
    pub status: OrderStatus,
}

/// Trade event as observed on the venue's user-trade stream. Price/size
/// arrive as wire strings; parse failures are treated as 0 per §7, never as
/// a rejection of the event.
#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub id: String,
    pub order_id: String,
    pub asset_id: AssetId,
    pub side: Side,
    pub price: String,
    pub size: String,
    pub market: MarketId,
}

fn parse_or_zero(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

struct Inner {
    orders: HashMap<String, Order>,
    fills: Vec<Fill>,
    positions: HashMap<AssetId, Position>,
}

/// Callback fired after a trade event is fully applied, outside the lock.
pub type OnFill = Arc<dyn Fn(&Fill) + Send + Sync>;

pub struct ExecutionTracker {
    inner: RwLock<Inner>,
    on_fill: RwLock<Option<OnFill>>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                orders: HashMap::new(),
                fills: Vec::new(),
                positions: HashMap::new(),
            }),
            on_fill: RwLock::new(None),
        }
    }

    pub fn set_on_fill(&self, cb: OnFill) {
        *self.on_fill.write() = Some(cb);
    }

    /// Insert a LIVE order with now-timestamps. Used when we place an order
    /// ourselves, prior to any ack on the user-order stream.
    pub fn register_order(
        &self,
        id: impl Into<String>,
        asset: impl Into<String>,
        market: impl Into<String>,
        side: Side,
        price: f64,
        size: f64,
    ) {
        let now = now_millis();
        let order = Order {
            id: id.into(),
            asset_id: asset.into(),
            market: market.into(),
            side,
            status: OrderStatus::Live,
            price,
            orig_size: size,
            filled_size: 0.0,
            created_at: now,
            updated_at: now,
        };
        self.inner.write().orders.insert(order.id.clone(), order);
    }

    /// Apply an order-state event. Status transitions never re-open a
    /// CANCELED order; unknown ids create a stub from the event fields.
    pub fn process_order_event(&self, ev: OrderEvent) {
        let now = now_millis();
        let mut inner = self.inner.write();
        match inner.orders.get_mut(&ev.id) {
            Some(existing) => {
                if existing.status == OrderStatus::Canceled {
                    return;
                }
                existing.status = ev.status;
                existing.filled_size = ev.matched_size;
                existing.updated_at = now;
            }
            None => {
                inner.orders.insert(
                    ev.id.clone(),
                    Order {
                        id: ev.id,
                        asset_id: ev.asset_id,
                        market: ev.market,
                        side: ev.side,
                        status: ev.status,
                        price: ev.price,
                        orig_size: ev.orig_size,
                        filled_size: ev.matched_size,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
    }

    /// Apply a trade event: parse price/size, discard zero/negative size,
    /// append the fill, update the position, then — after releasing the
    /// lock — invoke the `OnFill` callback.
    pub fn process_trade_event(&self, ev: TradeEvent) {
        let price = parse_or_zero(&ev.price);
        let size = parse_or_zero(&ev.size);
        if size <= 0.0 {
            return;
        }

        let fill = Fill {
            trade_id: ev.id,
            order_id: ev.order_id,
            asset_id: ev.asset_id,
            side: ev.side,
            price,
            size,
            timestamp: now_millis(),
        };

        {
            let mut inner = self.inner.write();
            inner.fills.push(fill.clone());
            update_position(&mut inner.positions, &fill);
        }

        if let Some(cb) = self.on_fill.read().clone() {
            cb(&fill);
        }
    }

    pub fn open_order_count(&self) -> usize {
        self.inner
            .read()
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Live)
            .count()
    }

    pub fn total_realized_pnl(&self) -> f64 {
        self.inner.read().positions.values().map(|p| p.realized_pnl).sum()
    }

    /// Last `limit` fills, newest first.
    pub fn recent_fills(&self, limit: usize) -> Vec<Fill> {
        let inner = self.inner.read();
        inner
            .fills
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.inner.read().positions.values().cloned().collect()
    }

    pub fn position(&self, asset: &str) -> Option<Position> {
        self.inner.read().positions.get(asset).cloned()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.inner.read().orders.values().cloned().collect()
    }

    pub fn order(&self, id: &str) -> Option<Order> {
        self.inner.read().orders.get(id).cloned()
    }
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// `updatePosition` rules per §4.3. The BUY branch is intentionally pure
/// accumulation — it does not mirror the SELL branch's short-closing
/// realized-PnL math when the prior position is short. This asymmetry is
/// flagged in §9 as an open question to preserve, not fix.
fn update_position(positions: &mut HashMap<AssetId, Position>, f: &Fill) {
    let pos = positions
        .entry(f.asset_id.clone())
        .or_insert_with(|| Position {
            asset_id: f.asset_id.clone(),
            ..Default::default()
        });
    pos.total_fills += 1;

    match f.side {
        Side::Buy => {
            let new_net = pos.net_size + f.size;
            pos.avg_entry_price = if new_net != 0.0 {
                (pos.avg_entry_price * pos.net_size + f.price * f.size) / new_net
            } else {
                0.0
            };
            pos.net_size = new_net;
        }
        Side::Sell => {
            if pos.net_size > 0.0 {
                let closed_qty = f.size.min(pos.net_size);
                pos.realized_pnl += (f.price - pos.avg_entry_price) * closed_qty;
                pos.net_size -= f.size;
                if pos.net_size > 0.0 {
                    // partial close — avg entry on the remaining long is unchanged
                } else if pos.net_size < 0.0 {
                    // excess opens a short at this trade's price
                    pos.avg_entry_price = f.price;
                } else {
                    pos.avg_entry_price = 0.0;
                }
            } else {
                // increasing (or opening) a short — cost basis weighted over |netSize|
                let prior_short = -pos.net_size;
                let new_short = prior_short + f.size;
                pos.avg_entry_price = if new_short != 0.0 {
                    (pos.avg_entry_price * prior_short + f.price * f.size) / new_short
                } else {
                    0.0
                };
                pos.net_size -= f.size;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(side: Side, price: &str, size: &str) -> TradeEvent {
        TradeEvent {
            id: "t".into(),
            order_id: "o".into(),
            asset_id: "a".into(),
            side,
            price: price.into(),
            size: size.into(),
            market: "m".into(),
        }
    }

    #[test]
    fn buy_then_sell_equal_size_realizes_spread_and_flattens() {
        let tracker = ExecutionTracker::new();
        tracker.process_trade_event(trade(Side::Buy, "0.50", "10"));
        tracker.process_trade_event(trade(Side::Sell, "0.60", "10"));
        let pos = tracker.position("a").unwrap();
        assert!((pos.realized_pnl - 1.0).abs() < 1e-9); // (0.60-0.50)*10
        assert_eq!(pos.net_size, 0.0);
        assert_eq!(pos.avg_entry_price, 0.0);
    }

    #[test]
    fn weighted_entry_across_multiple_buys() {
        let tracker = ExecutionTracker::new();
        tracker.process_trade_event(trade(Side::Buy, "0.40", "10"));
        tracker.process_trade_event(trade(Side::Buy, "0.60", "10"));
        let pos = tracker.position("a").unwrap();
        assert!((pos.avg_entry_price - 0.50).abs() < 1e-9);
        assert_eq!(pos.net_size, 20.0);
    }

    #[test]
    fn zero_size_trade_is_a_no_op() {
        let tracker = ExecutionTracker::new();
        tracker.process_trade_event(trade(Side::Buy, "0.50", "0"));
        assert!(tracker.position("a").is_none());
        assert_eq!(tracker.recent_fills(10).len(), 0);
    }

    #[test]
    fn unparseable_size_treated_as_zero_and_dropped() {
        let tracker = ExecutionTracker::new();
        tracker.process_trade_event(trade(Side::Buy, "0.50", "not-a-number"));
        assert!(tracker.position("a").is_none());
    }

    #[test]
    fn buy_does_not_symmetrically_close_a_short() {
        // Open a short of 10 at 0.60, then BUY 5 at 0.50.
        let tracker = ExecutionTracker::new();
        tracker.process_trade_event(trade(Side::Sell, "0.60", "10"));
        let short = tracker.position("a").unwrap();
        assert_eq!(short.net_size, -10.0);
        assert_eq!(short.avg_entry_price, 0.60);

        tracker.process_trade_event(trade(Side::Buy, "0.50", "5"));
        let pos = tracker.position("a").unwrap();
        // Pure accumulation per the preserved asymmetry: avgEntry is
        // reweighted across the signed netSize, not "closed" with a
        // separate realized-PnL branch the way SELL-against-long is.
        let expected_avg = (0.60 * -10.0 + 0.50 * 5.0) / (-10.0 + 5.0);
        assert!((pos.avg_entry_price - expected_avg).abs() < 1e-9);
        assert_eq!(pos.net_size, -5.0);
        // No realized PnL booked on this BUY — the asymmetry means the
        // short-closing branch (with its own realized-PnL math) never runs.
        assert_eq!(pos.realized_pnl, 0.0);
    }

    #[test]
    fn open_order_count_only_counts_live() {
        let tracker = ExecutionTracker::new();
        tracker.register_order("o1", "a", "m", Side::Buy, 0.5, 10.0);
        tracker.register_order("o2", "a", "m", Side::Buy, 0.5, 10.0);
        assert_eq!(tracker.open_order_count(), 2);

        tracker.process_order_event(OrderEvent {
            id: "o1".into(),
            asset_id: "a".into(),
            market: "m".into(),
            side: Side::Buy,
            price: 0.5,
            orig_size: 10.0,
            matched_size: 10.0,
            status: OrderStatus::Filled,
        });
        assert_eq!(tracker.open_order_count(), 1);
    }

    #[test]
    fn canceled_order_does_not_reopen() {
        let tracker = ExecutionTracker::new();
        tracker.register_order("o1", "a", "m", Side::Buy, 0.5, 10.0);
        tracker.process_order_event(OrderEvent {
            id: "o1".into(),
            asset_id: "a".into(),
            market: "m".into(),
            side: Side::Buy,
            price: 0.5,
            orig_size: 10.0,
            matched_size: 0.0,
            status: OrderStatus::Canceled,
        });
        tracker.process_order_event(OrderEvent {
            id: "o1".into(),
            asset_id: "a".into(),
            market: "m".into(),
            side: Side::Buy,
            price: 0.5,
            orig_size: 10.0,
            matched_size: 5.0,
            status: OrderStatus::Live,
        });
        assert_eq!(tracker.order("o1").unwrap().status, OrderStatus::Canceled);
    }

    #[test]
    fn on_fill_callback_fires_with_the_fill() {
        let tracker = ExecutionTracker::new();
        let seen: Arc<parking_lot::Mutex<Vec<f64>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        tracker.set_on_fill(Arc::new(move |f| seen2.lock().push(f.size)));
        tracker.process_trade_event(trade(Side::Buy, "0.5", "3"));
        assert_eq!(*seen.lock(), vec![3.0]);
    }
}
