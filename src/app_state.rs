// =============================================================================
// Central Application State — Convergence Engine
// =============================================================================
//
// Ties together the independently-synchronized leaf components so the
// dashboard and the dispatcher can share them via `Arc`. Mirrors the
// teacher's `AppState`: atomic/lock-guarded shared collections, subsystem
// engines that manage their own interior mutability, a single struct built
// once at startup and wrapped in `Arc`.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

use crate::config::Config;
use crate::crypto::CryptoTracker;
use crate::execution_tracker::ExecutionTracker;
use crate::flow::FlowTracker;
use crate::notifier::Notifier;
use crate::paper::PaperSimulator;
use crate::risk::RiskManager;
use crate::types::TradingState;

/// Central state shared across the dispatcher task and the dashboard API via
/// `Arc<AppState>`. Fields that the dispatcher exclusively mutates during
/// normal operation (book snapshot, maker/taker state, active-orders map,
/// asset/market/pair maps) live on the `Dispatcher` itself, not here — see
/// §3 "Ownership".
pub struct AppState {
    pub config: Config,
    pub tracker: Arc<ExecutionTracker>,
    pub risk: Arc<RiskManager>,
    pub paper: Arc<PaperSimulator>,
    pub flow: Arc<FlowTracker>,
    pub crypto: Arc<CryptoTracker>,
    pub notifier: Arc<dyn Notifier>,

    /// Operator-controlled run state: `Paused` suppresses new quote/taker
    /// evaluation without touching the risk emergency-stop latch; `Killed`
    /// is a terminal state requiring a process restart.
    pub trading_state: RwLock<TradingState>,
    pub start_time: Instant,
}

/// Dashboard-facing snapshot of the whole engine (`GET /api/v1/state`).
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub trading_state: TradingState,
    pub trading_mode: crate::types::TradingMode,
    pub uptime_secs: u64,
    pub open_order_count: usize,
    pub total_realized_pnl: f64,
    pub risk: crate::risk::RiskSnapshot,
    pub paper: crate::paper::PaperAccount,
    pub position_count: usize,
}

impl AppState {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        let risk = Arc::new(RiskManager::new(config.risk.clone()));
        let paper = Arc::new(PaperSimulator::new(config.paper.clone()));
        let flow = Arc::new(FlowTracker::new(config.taker.flow_window()));
        let crypto = Arc::new(CryptoTracker::new(config.crypto.clone()));

        Self {
            config,
            tracker: Arc::new(ExecutionTracker::new()),
            risk,
            paper,
            flow,
            crypto,
            notifier,
            trading_state: RwLock::new(TradingState::Paused),
            start_time: Instant::now(),
        }
    }

    pub fn build_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            trading_state: *self.trading_state.read(),
            trading_mode: self.config.trading_mode,
            uptime_secs: self.start_time.elapsed().as_secs(),
            open_order_count: self.tracker.open_order_count(),
            total_realized_pnl: self.tracker.total_realized_pnl(),
            risk: self.risk.snapshot(),
            paper: self.paper.snapshot(),
            position_count: self.tracker.positions().len(),
        }
    }

    /// `true` when the dispatcher should skip strategy evaluation for new
    /// orders this tick (still processes order/trade/risk events).
    pub fn is_paused_or_killed(&self) -> bool {
        !matches!(*self.trading_state.read(), TradingState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::LoggingNotifier;

    #[test]
    fn new_state_starts_paused_with_zeroed_counters() {
        let state = AppState::new(Config::default(), Arc::new(LoggingNotifier));
        assert_eq!(*state.trading_state.read(), TradingState::Paused);
        assert!(state.is_paused_or_killed());
        let snap = state.build_snapshot();
        assert_eq!(snap.open_order_count, 0);
        assert_eq!(snap.total_realized_pnl, 0.0);
    }
}
