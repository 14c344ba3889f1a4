// =============================================================================
// Risk Manager — pre-trade admission + post-trade cooldown/drawdown gates
// =============================================================================
//
// `Allow` checks run in a fixed order: emergency -> cooldown -> open-order
// cap -> daily-loss cap -> per-market cap. The position-exposure map is
// updated only by `sync_from_tracker` (full rebuild) or the `add_position`/
// `remove_position` helpers — never incrementally by `allow` itself.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::execution_tracker::Position;
use crate::types::{now_millis, AssetId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub max_open_orders: u32,
    #[serde(default)]
    pub max_daily_loss_usdc: f64,
    #[serde(default)]
    pub max_daily_loss_pct: f64,
    #[serde(default)]
    pub account_capital_usdc: f64,
    #[serde(default)]
    pub max_position_per_market: f64,
    #[serde(default)]
    pub stop_loss_per_market: f64,
    #[serde(default)]
    pub max_drawdown_pct: f64,
    #[serde(default = "default_risk_sync_interval", with = "crate::types::duration_secs")]
    pub risk_sync_interval: Duration,
    #[serde(default)]
    pub max_consecutive_losses: u32,
    #[serde(default, with = "crate::types::duration_secs")]
    pub consecutive_loss_cooldown: Duration,
}

fn default_risk_sync_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_open_orders: 20,
            max_daily_loss_usdc: 0.0,
            max_daily_loss_pct: 0.0,
            account_capital_usdc: 1000.0,
            max_position_per_market: 0.0,
            stop_loss_per_market: 0.0,
            max_drawdown_pct: 0.0,
            risk_sync_interval: Duration::from_secs(5),
            max_consecutive_losses: 0,
            consecutive_loss_cooldown: Duration::from_secs(0),
        }
    }
}

/// Dashboard-facing snapshot of current risk state, per §3 data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub emergency_stop: bool,
    pub daily_pnl: f64,
    pub daily_loss_limit_usdc: f64,
    pub consecutive_losses: u32,
    pub max_consecutive_losses: u32,
    pub in_cooldown: bool,
    pub cooldown_remaining_millis: i64,
}

struct PositionExposure {
    avg_entry_price: f64,
    net_size: f64,
}

struct Inner {
    emergency_stop: bool,
    daily_pnl: f64,
    daily_start_pnl: f64,
    consecutive_losses: u32,
    cooldown_deadline: Option<i64>,
    open_orders: u32,
    positions: HashMap<AssetId, PositionExposure>,
}

pub struct RiskManager {
    config: RiskConfig,
    inner: RwLock<Inner>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                emergency_stop: false,
                daily_pnl: 0.0,
                daily_start_pnl: 0.0,
                consecutive_losses: 0,
                cooldown_deadline: None,
                open_orders: 0,
                positions: HashMap::new(),
            }),
        }
    }

    fn effective_daily_loss_limit(&self) -> f64 {
        let abs = self.config.max_daily_loss_usdc;
        let pct_based = self.config.account_capital_usdc * self.config.max_daily_loss_pct;
        if abs > 0.0 && pct_based > 0.0 {
            abs.min(pct_based)
        } else if abs > 0.0 {
            abs
        } else {
            pct_based
        }
    }

    /// Pre-trade admission check. Returns `Ok(())` or the rejection kind as
    /// a string, exactly the fixed sequence of §4.4.
    pub fn allow(&self, asset: &str, amount_usdc: f64) -> Result<(), &'static str> {
        let inner = self.inner.read();

        if inner.emergency_stop {
            return Err("emergency_stop");
        }

        if let Some(deadline) = inner.cooldown_deadline {
            if now_millis() < deadline {
                return Err("loss_cooldown_active");
            }
        }

        if self.config.max_open_orders > 0 && inner.open_orders >= self.config.max_open_orders {
            return Err("max_open_orders");
        }

        let limit = self.effective_daily_loss_limit();
        if limit > 0.0 && inner.daily_pnl <= -limit {
            return Err("daily_loss_limit_reached");
        }

        if self.config.max_position_per_market > 0.0 {
            let existing = inner
                .positions
                .get(asset)
                .map(|p| p.avg_entry_price * p.net_size.abs())
                .unwrap_or(0.0);
            if existing + amount_usdc > self.config.max_position_per_market {
                return Err("position_limit");
            }
        }

        Ok(())
    }

    pub fn set_open_orders(&self, count: u32) {
        self.inner.write().open_orders = count;
    }

    pub fn add_position(&self, asset: &str, avg_entry_price: f64, net_size: f64) {
        self.inner.write().positions.insert(
            asset.to_string(),
            PositionExposure {
                avg_entry_price,
                net_size,
            },
        );
    }

    pub fn remove_position(&self, asset: &str) {
        self.inner.write().positions.remove(asset);
    }

    /// Rebuild the position-exposure map wholesale from the tracker, and
    /// store the caller-supplied daily *delta* directly into `daily_pnl`
    /// (see §9 — the dispatcher, not this method, is responsible for
    /// turning a cumulative realized PnL into a daily delta).
    pub fn sync_from_tracker(&self, daily_delta: f64, positions: &[Position]) {
        let mut inner = self.inner.write();
        inner.daily_pnl = daily_delta;
        inner.positions.clear();
        for p in positions {
            if p.net_size != 0.0 {
                inner.positions.insert(
                    p.asset_id.clone(),
                    PositionExposure {
                        avg_entry_price: p.avg_entry_price,
                        net_size: p.net_size,
                    },
                );
            }
        }
    }

    /// `Δ<0` increments the consecutive-loss counter; `Δ>0` resets it;
    /// `Δ=0` leaves it unchanged. Crossing the configured threshold arms a
    /// cooldown deadline and resets the counter to 0 — this is what lets a
    /// single loss right after a natural cooldown expiry leave the counter
    /// at 1 rather than immediately re-arming (§9 open question).
    pub fn record_trade_result(&self, delta: f64) {
        let mut inner = self.inner.write();
        if delta < 0.0 {
            inner.consecutive_losses += 1;
            if self.config.max_consecutive_losses > 0
                && inner.consecutive_losses >= self.config.max_consecutive_losses
            {
                let duration = if self.config.consecutive_loss_cooldown.as_secs() == 0 {
                    Duration::from_secs(15 * 60)
                } else {
                    self.config.consecutive_loss_cooldown
                };
                inner.cooldown_deadline = Some(now_millis() + duration.as_millis() as i64);
                inner.consecutive_losses = 0;
            }
        } else if delta > 0.0 {
            inner.consecutive_losses = 0;
        }
    }

    pub fn in_cooldown(&self) -> bool {
        match self.inner.read().cooldown_deadline {
            Some(deadline) => now_millis() < deadline,
            None => false,
        }
    }

    /// `true` when `realizedPnL + (currentMid - avgEntry) * netSize <=
    /// -stopLossPerMarket`, only when a positive stop-loss is configured.
    pub fn evaluate_stop_loss(&self, pos: &Position, current_mid: f64) -> bool {
        if self.config.stop_loss_per_market <= 0.0 {
            return false;
        }
        let unrealized = (current_mid - pos.avg_entry_price) * pos.net_size;
        pos.realized_pnl + unrealized <= -self.config.stop_loss_per_market
    }

    /// `true` when `-(realized+unrealized)/capital >= maxDrawdownPct`.
    pub fn evaluate_drawdown(&self, realized: f64, unrealized: f64, capital: f64) -> bool {
        if self.config.max_drawdown_pct <= 0.0 || capital <= 0.0 {
            return false;
        }
        -(realized + unrealized) / capital >= self.config.max_drawdown_pct
    }

    pub fn set_emergency_stop(&self, on: bool) {
        self.inner.write().emergency_stop = on;
    }

    pub fn emergency_stop(&self) -> bool {
        self.inner.read().emergency_stop
    }

    /// Snapshot today's `daily_pnl` into `daily_start_pnl`, zero it, and
    /// clear the consecutive-loss counter and cooldown.
    pub fn reset_daily(&self) {
        let mut inner = self.inner.write();
        inner.daily_start_pnl = inner.daily_pnl;
        inner.daily_pnl = 0.0;
        inner.consecutive_losses = 0;
        inner.cooldown_deadline = None;
    }

    pub fn snapshot(&self) -> RiskSnapshot {
        let inner = self.inner.read();
        let remaining = match inner.cooldown_deadline {
            Some(deadline) => (deadline - now_millis()).max(0),
            None => 0,
        };
        RiskSnapshot {
            emergency_stop: inner.emergency_stop,
            daily_pnl: inner.daily_pnl,
            daily_loss_limit_usdc: self.effective_daily_loss_limit(),
            consecutive_losses: inner.consecutive_losses,
            max_consecutive_losses: self.config.max_consecutive_losses,
            in_cooldown: inner
                .cooldown_deadline
                .map(|d| now_millis() < d)
                .unwrap_or(false),
            cooldown_remaining_millis: remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(avg_entry: f64, net_size: f64) -> Position {
        Position {
            asset_id: "t1".into(),
            net_size,
            avg_entry_price: avg_entry,
            realized_pnl: 0.0,
            total_fills: 1,
        }
    }

    #[test]
    fn scenario_risk_limit_reached() {
        let risk = RiskManager::new(RiskConfig {
            max_daily_loss_usdc: 100.0,
            max_position_per_market: 50.0,
            max_open_orders: 20,
            ..Default::default()
        });
        risk.sync_from_tracker(-101.0, &[]);
        assert_eq!(risk.allow("t1", 25.0), Err("daily_loss_limit_reached"));
    }

    #[test]
    fn scenario_cooldown_after_losses() {
        let risk = RiskManager::new(RiskConfig {
            max_consecutive_losses: 2,
            consecutive_loss_cooldown: Duration::from_secs(60),
            ..Default::default()
        });
        risk.record_trade_result(-0.10); // BUY 10@0.60 / SELL 10@0.50
        risk.record_trade_result(-0.10); // BUY 10@0.70 / SELL 10@0.60 (loss again)
        assert!(risk.in_cooldown());
        assert_eq!(risk.allow("t1", 1.0), Err("loss_cooldown_active"));
    }

    #[test]
    fn emergency_stop_rejects_everything() {
        let risk = RiskManager::new(RiskConfig::default());
        risk.set_emergency_stop(true);
        assert_eq!(risk.allow("any", 1.0), Err("emergency_stop"));
    }

    #[test]
    fn profit_resets_consecutive_loss_counter() {
        let risk = RiskManager::new(RiskConfig {
            max_consecutive_losses: 3,
            ..Default::default()
        });
        risk.record_trade_result(-1.0);
        risk.record_trade_result(-1.0);
        risk.record_trade_result(1.0);
        assert!(!risk.in_cooldown());
        assert_eq!(risk.snapshot().consecutive_losses, 0);
    }

    #[test]
    fn counter_resets_to_zero_on_arming_not_on_expiry() {
        let risk = RiskManager::new(RiskConfig {
            max_consecutive_losses: 2,
            consecutive_loss_cooldown: Duration::from_millis(1),
            ..Default::default()
        });
        risk.record_trade_result(-1.0);
        risk.record_trade_result(-1.0); // arms cooldown, counter -> 0
        std::thread::sleep(Duration::from_millis(5));
        assert!(!risk.in_cooldown()); // deadline passed
        risk.record_trade_result(-1.0); // single loss after expiry
        assert_eq!(risk.snapshot().consecutive_losses, 1);
        assert!(!risk.in_cooldown()); // not immediately re-armed
    }

    #[test]
    fn per_market_cap_blocks_when_exposure_plus_amount_exceeds_max() {
        let risk = RiskManager::new(RiskConfig {
            max_position_per_market: 50.0,
            ..Default::default()
        });
        risk.sync_from_tracker(0.0, &[pos(0.5, 80.0)]); // exposure = 40
        assert_eq!(risk.allow("t1", 20.0), Err("position_limit"));
        assert_eq!(risk.allow("t1", 5.0), Ok(()));
    }

    #[test]
    fn stop_loss_triggers_when_combined_pnl_breaches_threshold() {
        let risk = RiskManager::new(RiskConfig {
            stop_loss_per_market: 5.0,
            ..Default::default()
        });
        let mut p = pos(0.50, 100.0);
        p.realized_pnl = 0.0;
        // unrealized = (0.40-0.50)*100 = -10 <= -5
        assert!(risk.evaluate_stop_loss(&p, 0.40));
        assert!(!risk.evaluate_stop_loss(&p, 0.49));
    }

    #[test]
    fn drawdown_triggers_on_ratio() {
        let risk = RiskManager::new(RiskConfig {
            max_drawdown_pct: 0.10,
            ..Default::default()
        });
        assert!(risk.evaluate_drawdown(-80.0, -30.0, 1000.0));
        assert!(!risk.evaluate_drawdown(-10.0, 0.0, 1000.0));
    }

    #[test]
    fn reset_daily_clears_pnl_counter_and_cooldown() {
        let risk = RiskManager::new(RiskConfig {
            max_consecutive_losses: 1,
            consecutive_loss_cooldown: Duration::from_secs(600),
            ..Default::default()
        });
        risk.sync_from_tracker(-50.0, &[]);
        risk.record_trade_result(-1.0);
        assert!(risk.in_cooldown());
        risk.reset_daily();
        assert!(!risk.in_cooldown());
        assert_eq!(risk.snapshot().daily_pnl, 0.0);
    }
}
