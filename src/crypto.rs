// =============================================================================
// Crypto-Correlated Signal — rolling external-symbol price window -> market
// side/size (§2 "Crypto-correlated signal", §4.9 item 10)
// =============================================================================
//
// A binary market whose question tracks an external crypto symbol's price
// level (e.g. "will BTC close above $X") is wired to that symbol's price
// stream by a configured `asset_for_symbol` mapping. The rolling window
// mirrors `FlowTracker`'s eviction discipline; the signal itself is a simple
// momentum read over the window, in the spirit of `indicators::roc` — this
// sub-component is one of the least-specified in the source system, so the
// exact momentum math is this crate's own design choice, recorded in
// DESIGN.md.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{AssetId, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Maps an external symbol (e.g. "BTCUSDT") to the prediction-market
    /// asset whose price is expected to move with it.
    #[serde(default)]
    pub asset_for_symbol: HashMap<String, AssetId>,
    #[serde(default = "default_window", with = "crate::types::duration_secs")]
    pub window: Duration,
    #[serde(default)]
    pub momentum_threshold_bps: f64,
    #[serde(default)]
    pub amount_usdc: f64,
}

fn default_window() -> Duration {
    Duration::from_secs(300)
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            asset_for_symbol: HashMap::new(),
            window: default_window(),
            momentum_threshold_bps: 0.0,
            amount_usdc: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PriceSample {
    value: f64,
    timestamp_millis: i64,
}

struct SymbolWindow {
    samples: VecDeque<PriceSample>,
}

impl SymbolWindow {
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

/// A momentum signal for one external symbol, ready to route to the asset
/// the dispatcher trades on `asset_for_symbol`'s behalf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CryptoSignal {
    pub side: Side,
    pub amount_usdc: f64,
    pub return_bps: f64,
}

/// Rolling per-symbol price window; signals a side when the window-start to
/// window-end return crosses `momentum_threshold_bps`.
pub struct CryptoTracker {
    config: CryptoConfig,
    windows: RwLock<HashMap<String, SymbolWindow>>,
}

impl CryptoTracker {
    pub fn new(config: CryptoConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn asset_for_symbol(&self, symbol: &str) -> Option<AssetId> {
        self.config.asset_for_symbol.get(symbol).cloned()
    }

    fn cutoff(&self, now: i64) -> i64 {
        now - self.config.window.as_millis() as i64
    }

    /// Append a sample, evicting anything now out-of-window.
    pub fn record(&self, symbol: &str, value: f64, now: i64) {
        let cutoff = self.cutoff(now);
        let mut windows = self.windows.write();
        let w = windows
            .entry(symbol.to_string())
            .or_insert_with(SymbolWindow::new);
        w.samples.push_back(PriceSample {
            value,
            timestamp_millis: now,
        });
        w.evict(cutoff);
    }

    /// Oldest-to-newest return over the current window, in bps. `None` if
    /// fewer than two samples remain in-window.
    pub fn window_return_bps(&self, symbol: &str, now: i64) -> Option<f64> {
        let cutoff = self.cutoff(now);
        let mut windows = self.windows.write();
        let w = windows.get_mut(symbol)?;
        w.evict(cutoff);
        let first = w.samples.front()?.value;
        let last = w.samples.back()?.value;
        if first == 0.0 {
            return None;
        }
        Some((last - first) / first * 10_000.0)
    }

    /// Evaluate a momentum signal for `symbol`. `None` below threshold or
    /// when no asset mapping/insufficient samples exist.
    pub fn evaluate(&self, symbol: &str, now: i64) -> Option<CryptoSignal> {
        self.asset_for_symbol(symbol)?;
        let return_bps = self.window_return_bps(symbol, now)?;
        if return_bps.abs() < self.config.momentum_threshold_bps {
            return None;
        }
        let side = if return_bps > 0.0 { Side::Buy } else { Side::Sell };
        Some(CryptoSignal {
            side,
            amount_usdc: self.config.amount_usdc,
            return_bps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> CryptoTracker {
        let mut asset_for_symbol = HashMap::new();
        asset_for_symbol.insert("BTCUSDT".to_string(), "btc-yes".to_string());
        CryptoTracker::new(CryptoConfig {
            symbols: vec!["BTCUSDT".into()],
            asset_for_symbol,
            window: Duration::from_secs(60),
            momentum_threshold_bps: 50.0,
            amount_usdc: 10.0,
        })
    }

    #[test]
    fn no_signal_with_fewer_than_two_samples() {
        let t = tracker();
        t.record("BTCUSDT", 100.0, 0);
        assert!(t.evaluate("BTCUSDT", 0).is_none());
    }

    #[test]
    fn no_signal_below_threshold() {
        let t = tracker();
        t.record("BTCUSDT", 100.0, 0);
        t.record("BTCUSDT", 100.1, 1_000);
        assert!(t.evaluate("BTCUSDT", 1_000).is_none());
    }

    #[test]
    fn upward_momentum_signals_buy() {
        let t = tracker();
        t.record("BTCUSDT", 100.0, 0);
        t.record("BTCUSDT", 101.0, 1_000); // +100bps
        let sig = t.evaluate("BTCUSDT", 1_000).unwrap();
        assert_eq!(sig.side, Side::Buy);
        assert!((sig.return_bps - 100.0).abs() < 1e-6);
    }

    #[test]
    fn downward_momentum_signals_sell() {
        let t = tracker();
        t.record("BTCUSDT", 100.0, 0);
        t.record("BTCUSDT", 99.0, 1_000);
        let sig = t.evaluate("BTCUSDT", 1_000).unwrap();
        assert_eq!(sig.side, Side::Sell);
    }

    #[test]
    fn unmapped_symbol_never_signals() {
        let t = tracker();
        t.record("ETHUSDT", 100.0, 0);
        t.record("ETHUSDT", 200.0, 1_000);
        assert!(t.evaluate("ETHUSDT", 1_000).is_none());
    }

    #[test]
    fn samples_outside_window_are_evicted() {
        let t = tracker();
        t.record("BTCUSDT", 100.0, 0);
        t.record("BTCUSDT", 200.0, 70_000); // window is 60s; first sample evicted
        assert!(t.evaluate("BTCUSDT", 70_000).is_none());
    }
}
