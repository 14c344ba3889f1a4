// =============================================================================
// Flow Tracker — rolling-window per-asset buy/sell volume
// =============================================================================
//
// A genuine sliding window (not a periodically-reset cumulative counter):
// samples older than the window are evicted both on write and on read, so a
// caller that never trades still sees `NetFlow` decay to 0 as old samples
// age out.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::RwLock;

use crate::types::{AssetId, Side};

/// One observed trade sample.
#[derive(Debug, Clone, Copy)]
pub struct FlowSample {
    pub side: Side,
    pub size: f64,
    pub price: f64,
    pub timestamp_millis: i64,
}

struct AssetWindow {
    samples: VecDeque<FlowSample>,
}

impl AssetWindow {
    fn new() -> Self {
        Self {
            samples: VecDeque::new(),
        }
    }

    fn evict(&mut self, cutoff: i64) {
        while let Some(front) = self.samples.front() {
            if front.timestamp_millis < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window aggregator, one window per asset. The window length is a
/// constructor parameter (default 2 minutes per §4.2).
pub struct FlowTracker {
    window: Duration,
    assets: RwLock<HashMap<AssetId, AssetWindow>>,
}

impl FlowTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            assets: RwLock::new(HashMap::new()),
        }
    }

    fn cutoff(&self, now: i64) -> i64 {
        now - self.window.as_millis() as i64
    }

    /// Append a sample, evicting anything now out-of-window for this asset.
    pub fn record(&self, asset: &str, side: Side, size: f64, price: f64, now: i64) {
        let cutoff = self.cutoff(now);
        let mut assets = self.assets.write();
        let w = assets
            .entry(asset.to_string())
            .or_insert_with(AssetWindow::new);
        w.samples.push_back(FlowSample {
            side,
            size,
            price,
            timestamp_millis: now,
        });
        w.evict(cutoff);
    }

    /// `(buyVol - sellVol) / (buyVol + sellVol)`, in `[-1, 1]`, or 0 when the
    /// window for this asset is empty.
    pub fn net_flow(&self, asset: &str, now: i64) -> f64 {
        let cutoff = self.cutoff(now);
        let mut assets = self.assets.write();
        let Some(w) = assets.get_mut(asset) else {
            return 0.0;
        };
        w.evict(cutoff);

        let mut buy_vol = 0.0;
        let mut sell_vol = 0.0;
        for s in &w.samples {
            match s.side {
                Side::Buy => buy_vol += s.size,
                Side::Sell => sell_vol += s.size,
            }
        }
        let total = buy_vol + sell_vol;
        if total == 0.0 {
            0.0
        } else {
            (buy_vol - sell_vol) / total
        }
    }

    /// Volume-weighted average price over the window, or 0 if empty.
    pub fn vwap(&self, asset: &str, now: i64) -> f64 {
        let cutoff = self.cutoff(now);
        let mut assets = self.assets.write();
        let Some(w) = assets.get_mut(asset) else {
            return 0.0;
        };
        w.evict(cutoff);

        let mut notional = 0.0;
        let mut size_sum = 0.0;
        for s in &w.samples {
            notional += s.price * s.size;
            size_sum += s.size;
        }
        if size_sum == 0.0 {
            0.0
        } else {
            notional / size_sum
        }
    }
}

impl Default for FlowTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_has_zero_net_flow_and_vwap() {
        let t = FlowTracker::new(Duration::from_secs(60));
        assert_eq!(t.net_flow("a", 0), 0.0);
        assert_eq!(t.vwap("a", 0), 0.0);
    }

    #[test]
    fn net_flow_reflects_buy_sell_mix() {
        let t = FlowTracker::new(Duration::from_secs(60));
        t.record("a", Side::Buy, 10.0, 0.5, 1_000);
        t.record("a", Side::Sell, 5.0, 0.5, 1_500);
        // (10-5)/(10+5) = 1/3
        assert!((t.net_flow("a", 2_000) - (1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn samples_older_than_window_are_evicted_on_read() {
        let t = FlowTracker::new(Duration::from_millis(1_000));
        t.record("a", Side::Buy, 10.0, 0.5, 0);
        // far beyond the window — the old BUY sample must be evicted.
        assert_eq!(t.net_flow("a", 5_000), 0.0);
    }

    #[test]
    fn vwap_is_notional_weighted() {
        let t = FlowTracker::new(Duration::from_secs(60));
        t.record("a", Side::Buy, 10.0, 0.40, 0);
        t.record("a", Side::Buy, 10.0, 0.60, 0);
        assert!((t.vwap("a", 0) - 0.50).abs() < 1e-9);
    }
}
