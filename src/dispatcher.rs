// =============================================================================
// Dispatcher — the single-writer trading loop (§4.9)
// =============================================================================
//
// One task owns every field on `Dispatcher` (book snapshot, maker/taker
// state ownership, active-orders map, asset-to-market map, pair map, crypto
// tracker hookup) — no other task ever mutates them. `AppState`'s own
// internally-synchronized components (tracker, risk, paper, flow) may be
// read concurrently by the dashboard while this loop runs; this file never
// holds more than one of their locks at a time.
//
// Within one asset, `Update(book) -> Cancel(old orders) -> Place(new)` is
// sequential (§5 ordering guarantees) because all three happen inline,
// synchronously, inside one event's handler before the next event is read
// off any channel.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Timelike, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::app_state::AppState;
use crate::book::{BookEvent, BookSnapshot};
use crate::execution_tracker::{OrderEvent, TradeEvent};
use crate::notifier::NotificationEvent;
use crate::selector::MarketSelector;
use crate::strategy::maker::{InventoryState, MakerStrategy};
use crate::strategy::taker::TakerStrategy;
use crate::types::{now_millis, AssetId, MarketId, OrderStatus, Side, TradingMode};
use crate::venue::{CryptoPriceEvent, OrderKind, ResolvedEvent, SignableOrderRequest, Signer, Venue};

/// Channel endpoints the dispatcher selects over. Each is fed by an
/// independent I/O task; the dispatcher itself never performs a network
/// call that isn't a direct consequence of processing one event.
pub struct DispatcherChannels {
    pub book_rx: mpsc::Receiver<BookEvent>,
    pub order_rx: mpsc::Receiver<OrderEvent>,
    pub trade_rx: mpsc::Receiver<TradeEvent>,
    pub resolution_rx: mpsc::Receiver<ResolvedEvent>,
    pub crypto_rx: mpsc::Receiver<(String, CryptoPriceEvent)>,
    pub shutdown_rx: watch::Receiver<bool>,
}

pub struct Dispatcher {
    state: Arc<AppState>,
    venue: Option<Arc<dyn Venue>>,
    signer: Arc<dyn Signer>,
    selector: Arc<dyn MarketSelector>,
    mode: TradingMode,

    maker: MakerStrategy,
    taker: TakerStrategy,
    book: BookSnapshot,

    asset_to_market: HashMap<AssetId, MarketId>,
    pair_map: HashMap<AssetId, AssetId>,
    active_orders: HashMap<AssetId, Vec<String>>,
    fee_rates: HashMap<AssetId, f64>,
    known_assets: HashSet<AssetId>,

    /// Cumulative realized PnL as of the last risk-sync tick; the delta
    /// since this value is what `RecordTradeResult` receives.
    last_sync_realized: f64,
    /// Cumulative realized PnL as of the last daily reset; the delta since
    /// this value is the *daily* PnL that `SyncFromTracker` expects (§9).
    daily_baseline_realized: f64,
}

impl Dispatcher {
    pub fn new(
        state: Arc<AppState>,
        venue: Option<Arc<dyn Venue>>,
        signer: Arc<dyn Signer>,
        selector: Arc<dyn MarketSelector>,
    ) -> Self {
        let mode = state.config.trading_mode;
        let maker = MakerStrategy::new(state.config.maker.clone());
        let taker = TakerStrategy::new(state.config.taker.clone());
        Self {
            state,
            venue,
            signer,
            selector,
            mode,
            maker,
            taker,
            book: BookSnapshot::new(),
            asset_to_market: HashMap::new(),
            pair_map: HashMap::new(),
            active_orders: HashMap::new(),
            fee_rates: HashMap::new(),
            known_assets: HashSet::new(),
            last_sync_realized: 0.0,
            daily_baseline_realized: 0.0,
        }
    }

    /// Register a binary market's YES/NO pair so the convergence-arbitrage
    /// subroutine and counterpart-mid lookups can find each other.
    pub fn register_market(&mut self, market: MarketId, yes: AssetId, no: AssetId) {
        self.asset_to_market.insert(yes.clone(), market.clone());
        self.asset_to_market.insert(no.clone(), market);
        self.pair_map.insert(yes.clone(), no.clone());
        self.pair_map.insert(no.clone(), yes.clone());
        self.known_assets.insert(yes);
        self.known_assets.insert(no);
    }

    pub fn set_fee_rate(&mut self, asset: &str, fee_bps: f64) {
        self.fee_rates.insert(asset.to_string(), fee_bps);
    }

    // -------------------------------------------------------------------
    // Main loop
    // -------------------------------------------------------------------

    pub async fn run(mut self, mut channels: DispatcherChannels) -> anyhow::Result<()> {
        let risk_sync_interval = self.state.config.risk.risk_sync_interval;
        let heartbeat_interval = self.state.config.heartbeat_interval;
        let rescan_interval = self.state.config.selector.rescan_interval;

        let mut risk_sync_ticker = tokio::time::interval(risk_sync_interval);
        let mut heartbeat_ticker = tokio::time::interval(heartbeat_interval);
        let mut rescan_ticker = tokio::time::interval(rescan_interval);
        let mut daily_reset_deadline = next_utc_midnight();

        info!("dispatcher started");

        loop {
            tokio::select! {
                biased;

                changed = channels.shutdown_rx.changed() => {
                    if changed.is_err() || *channels.shutdown_rx.borrow() {
                        info!("shutdown signal received — cancelling all active orders");
                        self.shutdown().await;
                        return Ok(());
                    }
                }

                Some(ev) = channels.book_rx.recv() => {
                    self.handle_book_event(ev).await;
                }

                Some(ev) = channels.order_rx.recv() => {
                    self.handle_order_event(ev);
                }

                Some(ev) = channels.trade_rx.recv() => {
                    self.handle_trade_event(ev);
                }

                Some(ev) = channels.resolution_rx.recv() => {
                    self.handle_resolution_event(ev).await;
                }

                Some((symbol, ev)) = channels.crypto_rx.recv() => {
                    self.handle_crypto_event(symbol, ev).await;
                }

                _ = risk_sync_ticker.tick() => {
                    self.handle_risk_sync_tick().await;
                }

                _ = heartbeat_ticker.tick() => {
                    self.handle_heartbeat_tick().await;
                }

                _ = rescan_ticker.tick() => {
                    self.handle_rescan_tick().await;
                }

                _ = tokio::time::sleep_until(daily_reset_deadline) => {
                    self.handle_daily_reset_tick();
                    daily_reset_deadline = next_utc_midnight();
                }
            }
        }
    }

    // -------------------------------------------------------------------
    // Event handlers
    // -------------------------------------------------------------------

    async fn handle_book_event(&mut self, ev: BookEvent) {
        let asset = ev.asset_id.clone();
        let market = ev.market.clone();
        self.book.update(ev);

        if self.state.is_paused_or_killed() {
            return;
        }

        if self.state.config.maker.enabled
            && (self.state.config.maker.markets.is_empty()
                || self.state.config.maker.markets.contains(&asset))
        {
            self.evaluate_maker(&asset, &market).await;
        }

        if self.state.config.taker.enabled {
            self.evaluate_taker(&asset, &market).await;
        }

        if let Some(counterpart) = self.pair_map.get(&asset).cloned() {
            self.evaluate_convergence(&asset, &counterpart).await;
        }
    }

    async fn evaluate_maker(&mut self, asset: &str, market: &str) {
        let Some(book) = self.book.get(asset) else { return };

        let position = self.state.tracker.position(asset);
        let mid = book.mid();
        let inventory = match (&position, mid) {
            (Some(pos), Some(mid)) if self.state.config.risk.max_position_per_market > 0.0 && mid > 0.0 => {
                Some(InventoryState {
                    net_position: pos.net_size,
                    max_position: self.state.config.risk.max_position_per_market / mid,
                    avg_entry_price: pos.avg_entry_price,
                })
            }
            _ => None,
        };

        let Some(mut quote) = self.maker.compute_quote(&book, inventory) else {
            return;
        };

        if let Some(&fee_bps) = self.fee_rates.get(asset) {
            quote = self.maker.ensure_fee_covering(quote, fee_bps);
        }

        self.cancel_active_orders(asset).await;

        match self.state.risk.allow(asset, quote.size) {
            Ok(()) => self.place_limit(asset, market, Side::Buy, quote.buy, quote.size).await,
            Err(reason) => debug!(asset, reason, "maker buy rejected by risk"),
        }
        match self.state.risk.allow(asset, quote.size) {
            Ok(()) => self.place_limit(asset, market, Side::Sell, quote.sell, quote.size).await,
            Err(reason) => debug!(asset, reason, "maker sell rejected by risk"),
        }
    }

    async fn evaluate_taker(&mut self, asset: &str, market: &str) {
        let Some(book) = self.book.get(asset) else { return };
        let now = now_millis();
        let net_flow = self.state.flow.net_flow(asset, now);
        let counterpart_mid = self
            .pair_map
            .get(asset)
            .and_then(|cp| self.book.mid(cp).ok());

        let Some(signal) = self.taker.evaluate_enhanced(asset, &book, net_flow, counterpart_mid, now) else {
            return;
        };

        match self.state.risk.allow(asset, signal.amount_usdc) {
            Ok(()) => {
                self.place_market(asset, market, signal.side, signal.amount_usdc, signal.max_price).await;
                self.taker.record_trade(asset, now);
            }
            Err(reason) => debug!(asset, reason, "taker signal rejected by risk"),
        }
    }

    /// §4.7: on every book update for an asset whose counterpart is known.
    async fn evaluate_convergence(&mut self, asset: &str, counterpart: &str) {
        let Some(yes_mid) = self.book.mid(asset).ok().filter(|m| *m > 0.0) else { return };
        let Some(no_mid) = self.book.mid(counterpart).ok().filter(|m| *m > 0.0) else { return };

        let Some((_side, _edge_bps)) = self.taker.detect_convergence(yes_mid, no_mid) else {
            return;
        };

        let sum = yes_mid + no_mid;
        let amount = self.state.config.taker.amount_usdc;
        let slippage = self.state.config.taker.max_slippage_bps / 10_000.0;

        if sum < 1.0 {
            let half = amount / 2.0;
            let asset_market = self.asset_to_market.get(asset).cloned().unwrap_or_default();
            let cp_market = self.asset_to_market.get(counterpart).cloned().unwrap_or_default();
            for (leg_asset, leg_mid, leg_market) in [
                (asset.to_string(), yes_mid, asset_market),
                (counterpart.to_string(), no_mid, cp_market),
            ] {
                match self.state.risk.allow(&leg_asset, half) {
                    Ok(()) => {
                        let max_price = leg_mid * (1.0 + slippage);
                        self.place_market(&leg_asset, &leg_market, Side::Buy, half, max_price).await;
                    }
                    Err(reason) => debug!(asset = %leg_asset, reason, "convergence leg rejected by risk"),
                }
            }
        } else {
            let (expensive_asset, expensive_mid) = if yes_mid >= no_mid {
                (asset.to_string(), yes_mid)
            } else {
                (counterpart.to_string(), no_mid)
            };
            let market = self.asset_to_market.get(&expensive_asset).cloned().unwrap_or_default();
            match self.state.risk.allow(&expensive_asset, amount) {
                Ok(()) => {
                    let max_price = (expensive_mid * (1.0 - slippage)).max(0.01);
                    self.place_market(&expensive_asset, &market, Side::Sell, amount, max_price).await;
                }
                Err(reason) => debug!(asset = %expensive_asset, reason, "convergence unwind rejected by risk"),
            }
        }
    }

    fn handle_order_event(&mut self, ev: OrderEvent) {
        self.state.tracker.process_order_event(ev);
        self.sync_open_orders();
    }

    fn handle_trade_event(&mut self, ev: TradeEvent) {
        self.state.tracker.process_trade_event(ev);
    }

    async fn handle_resolution_event(&mut self, ev: ResolvedEvent) {
        info!(market = %ev.market, outcome = %ev.winning_outcome, "market resolved");
        for asset in &ev.asset_ids {
            self.cancel_active_orders(asset).await;
        }
        if let (TradingMode::Live, Some(venue)) = (self.mode, &self.venue) {
            if let Err(e) = venue.cancel_market_orders(&ev.market).await {
                warn!(market = %ev.market, error = %e, "cancel_market_orders failed on resolution");
            }
        }
    }

    async fn handle_crypto_event(&mut self, symbol: String, ev: CryptoPriceEvent) {
        self.state.crypto.record(&symbol, ev.value, ev.timestamp_millis);
        let Some(signal) = self.state.crypto.evaluate(&symbol, ev.timestamp_millis) else {
            return;
        };
        let Some(asset) = self.state.crypto.asset_for_symbol(&symbol) else { return };
        let market = self.asset_to_market.get(&asset).cloned().unwrap_or_default();
        let mid = self.book.mid(&asset).unwrap_or(0.5);
        let slippage = self.state.config.taker.max_slippage_bps / 10_000.0;
        let max_price = match signal.side {
            Side::Buy => mid * (1.0 + slippage),
            Side::Sell => (mid * (1.0 - slippage)).max(0.01),
        };

        match self.state.risk.allow(&asset, signal.amount_usdc) {
            Ok(()) => self.place_market(&asset, &market, signal.side, signal.amount_usdc, max_price).await,
            Err(reason) => debug!(asset, reason, "crypto signal rejected by risk"),
        }
    }

    async fn handle_risk_sync_tick(&mut self) {
        let realized = self.state.tracker.total_realized_pnl();
        let delta = realized - self.last_sync_realized;
        self.last_sync_realized = realized;
        self.state.risk.record_trade_result(delta);

        let daily_delta = realized - self.daily_baseline_realized;
        let positions = self.state.tracker.positions();
        self.state.risk.sync_from_tracker(daily_delta, &positions);

        let mut total_unrealized = 0.0;
        for pos in &positions {
            if pos.net_size == 0.0 {
                continue;
            }
            let Some(mid) = self.book.mid(&pos.asset_id).ok() else { continue };
            let unrealized = (mid - pos.avg_entry_price) * pos.net_size;
            total_unrealized += unrealized;

            if self.state.risk.evaluate_stop_loss(pos, mid) {
                warn!(asset = %pos.asset_id, "stop-loss triggered — unwinding position");
                self.cancel_active_orders(&pos.asset_id).await;
                let side = if pos.net_size > 0.0 { Side::Sell } else { Side::Buy };
                let amount = mid * pos.net_size.abs();
                let market = self.asset_to_market.get(&pos.asset_id).cloned().unwrap_or_default();
                self.place_market(&pos.asset_id, &market, side, amount, mid).await;
            }
        }

        if self
            .state
            .risk
            .evaluate_drawdown(realized, total_unrealized, self.state.config.risk.account_capital_usdc)
        {
            error!("drawdown threshold breached — setting emergency stop");
            self.state.risk.set_emergency_stop(true);
        }
    }

    async fn handle_heartbeat_tick(&mut self) {
        if let (TradingMode::Live, Some(venue)) = (self.mode, &self.venue) {
            if let Err(e) = venue.heartbeat().await {
                warn!(error = %e, "heartbeat failed");
            }
        }
    }

    fn handle_daily_reset_tick(&mut self) {
        self.state.risk.reset_daily();
        self.daily_baseline_realized = self.state.tracker.total_realized_pnl();
        self.last_sync_realized = self.daily_baseline_realized;
        self.state.notifier.notify(&NotificationEvent::DailySummary {
            realized_pnl: self.daily_baseline_realized,
            total_trades: self.state.paper.snapshot().total_trades,
            total_fills: self.state.tracker.recent_fills(usize::MAX).len(),
        });
        info!("daily reset complete");
    }

    async fn handle_rescan_tick(&mut self) {
        let selected: HashSet<AssetId> = self.selector.select().into_iter().collect();
        let added: Vec<AssetId> = selected.difference(&self.known_assets).cloned().collect();
        let removed: Vec<AssetId> = self.known_assets.difference(&selected).cloned().collect();

        for asset in &removed {
            if let (TradingMode::Live, Some(venue)) = (self.mode, &self.venue) {
                if let Err(e) = venue.unsubscribe_market_assets(std::slice::from_ref(asset)).await {
                    warn!(asset, error = %e, "unsubscribe failed");
                }
            }
            self.fee_rates.remove(asset);
        }

        for asset in &added {
            if let (TradingMode::Live, Some(venue)) = (self.mode, &self.venue) {
                match venue.fee_rate(asset).await {
                    Ok(rate) => {
                        self.fee_rates.insert(asset.clone(), rate);
                    }
                    Err(e) => warn!(asset, error = %e, "fee_rate refresh failed"),
                }
            }
        }

        if !added.is_empty() || !removed.is_empty() {
            info!(added = added.len(), removed = removed.len(), "rescan diff applied");
        }
        self.known_assets = selected;
    }

    // -------------------------------------------------------------------
    // Order placement / cancellation
    // -------------------------------------------------------------------

    async fn place_limit(&mut self, asset: &str, market: &str, side: Side, price: f64, amount_usdc: f64) {
        if price <= 0.0 || amount_usdc <= 0.0 {
            return;
        }
        let size = amount_usdc / price;

        match self.mode {
            TradingMode::Paper => {
                let Some(book) = self.book.get(asset) else {
                    warn!(asset, "no book snapshot for paper limit order");
                    return;
                };
                match self.state.paper.execute_limit(asset, side, price, amount_usdc, &book) {
                    Ok(order) => {
                        self.state.tracker.register_order(order.order_id.clone(), asset, market, side, order.price, size);
                        self.active_orders.entry(asset.to_string()).or_default().push(order.order_id.clone());
                        if order.filled {
                            self.record_paper_fill(asset, market, side, order.order_id, order.trade_id, order.price, size);
                        }
                        self.sync_open_orders();
                    }
                    Err(e) => warn!(asset, error = %e, "paper limit order rejected"),
                }
            }
            TradingMode::Live => {
                self.place_live_order(asset, market, side, price, size, OrderKind::Gtc).await;
            }
        }
    }

    async fn place_market(&mut self, asset: &str, market: &str, side: Side, amount_usdc: f64, max_price: f64) {
        if amount_usdc <= 0.0 {
            return;
        }

        match self.mode {
            TradingMode::Paper => {
                let Some(book) = self.book.get(asset) else {
                    warn!(asset, "no book snapshot for paper market order");
                    return;
                };
                match self.state.paper.execute_market(asset, side, amount_usdc, &book) {
                    Ok(order) => {
                        let size = amount_usdc / order.price;
                        self.state.tracker.register_order(order.order_id.clone(), asset, market, side, order.price, size);
                        self.record_paper_fill(asset, market, side, order.order_id, order.trade_id, order.price, size);
                        self.sync_open_orders();
                    }
                    Err(e) => warn!(asset, error = %e, "paper market order rejected"),
                }
            }
            TradingMode::Live => {
                let size = amount_usdc / max_price.max(0.01);
                self.place_live_order(asset, market, side, max_price, size, OrderKind::Fak).await;
            }
        }
    }

    async fn place_live_order(&mut self, asset: &str, market: &str, side: Side, price: f64, size: f64, kind: OrderKind) {
        let Some(venue) = self.venue.clone() else {
            warn!(asset, "live mode with no venue client configured");
            return;
        };
        let req = SignableOrderRequest {
            asset_id: asset.to_string(),
            side,
            price,
            size,
            order_type: kind,
            client_order_id: uuid::Uuid::new_v4().to_string(),
        };
        let unsigned = venue.build_signable(&req);
        let signed = match self.signer.sign(unsigned).await {
            Ok(s) => s,
            Err(e) => {
                warn!(asset, error = %e, "order signing failed");
                return;
            }
        };
        match venue.create_order_from_signable(&signed).await {
            Ok(placed) => {
                self.state.tracker.register_order(placed.id.clone(), asset, market, side, price, size);
                if placed.status != OrderStatus::Canceled {
                    self.active_orders.entry(asset.to_string()).or_default().push(placed.id);
                }
                self.sync_open_orders();
            }
            Err(e) => warn!(asset, error = %e, "venue order placement failed"),
        }
    }

    fn record_paper_fill(
        &self,
        asset: &str,
        market: &str,
        side: Side,
        order_id: String,
        trade_id: Option<String>,
        price: f64,
        size: f64,
    ) {
        let trade_id = trade_id.unwrap_or_else(|| format!("{order_id}-t"));
        self.state.tracker.process_trade_event(TradeEvent {
            id: trade_id,
            order_id,
            asset_id: asset.to_string(),
            side,
            price: price.to_string(),
            size: size.to_string(),
            market: market.to_string(),
        });
    }

    async fn cancel_active_orders(&mut self, asset: &str) {
        let Some(ids) = self.active_orders.remove(asset) else { return };
        if ids.is_empty() {
            return;
        }

        if let (TradingMode::Live, Some(venue)) = (self.mode, &self.venue) {
            if let Err(e) = venue.cancel_orders(&ids).await {
                warn!(asset, error = %e, "venue cancel_orders failed");
            }
        }

        for id in ids {
            if let Some(existing) = self.state.tracker.order(&id) {
                if existing.status.is_terminal() {
                    continue;
                }
                self.state.tracker.process_order_event(OrderEvent {
                    id,
                    asset_id: existing.asset_id,
                    market: existing.market,
                    side: existing.side,
                    price: existing.price,
                    orig_size: existing.orig_size,
                    matched_size: existing.filled_size,
                    status: OrderStatus::Canceled,
                });
            }
        }
        self.sync_open_orders();
    }

    fn sync_open_orders(&self) {
        self.state.risk.set_open_orders(self.state.tracker.open_order_count() as u32);
    }

    async fn shutdown(&mut self) {
        let assets: Vec<AssetId> = self.active_orders.keys().cloned().collect();
        for asset in assets {
            self.cancel_active_orders(&asset).await;
        }
        if let (TradingMode::Live, Some(venue)) = (self.mode, &self.venue) {
            match venue.cancel_all().await {
                Ok(count) => info!(count, "cancel_all completed on shutdown"),
                Err(e) => error!(error = %e, "cancel_all failed on shutdown"),
            }
        }
        info!(
            open_orders = self.state.tracker.open_order_count(),
            realized_pnl = self.state.tracker.total_realized_pnl(),
            "dispatcher shut down"
        );
    }
}

fn next_utc_midnight() -> tokio::time::Instant {
    let now = Utc::now();
    let today_midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();
    let next = if now.hour() == 0 && now.minute() == 0 && now.second() == 0 {
        today_midnight
    } else {
        today_midnight + ChronoDuration::days(1)
    };
    let secs_until = (next - now).num_seconds().max(1) as u64;
    tokio::time::Instant::now() + tokio::time::Duration::from_secs(secs_until)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use crate::book::PriceLevel;
    use crate::config::Config;
    use crate::notifier::LoggingNotifier;
    use crate::selector::StaticMarketSelector;
    use crate::types::TradingState;

    fn test_dispatcher() -> Dispatcher {
        let mut config = Config::default();
        config.trading_mode = TradingMode::Paper;
        config.maker.enabled = true;
        config.maker.order_size_usdc = 10.0;
        config.risk.max_open_orders = 20;
        let selector = Arc::new(StaticMarketSelector::new(&config.selector));
        let state = Arc::new(AppState::new(config, Arc::new(LoggingNotifier)));
        *state.trading_state.write() = TradingState::Running;
        Dispatcher::new(state, None, Arc::new(crate::venue::UnconfiguredSigner), selector)
    }

    fn book_event(asset: &str, bid: f64, ask: f64) -> BookEvent {
        BookEvent {
            asset_id: asset.to_string(),
            market: "m".to_string(),
            bids: vec![PriceLevel { price: bid, size: 100.0 }],
            asks: vec![PriceLevel { price: ask, size: 100.0 }],
        }
    }

    #[tokio::test]
    async fn maker_places_paired_orders_on_book_update() {
        let mut d = test_dispatcher();
        d.handle_book_event(book_event("a", 0.50, 0.52)).await;
        assert_eq!(d.state.tracker.open_order_count(), 2);
        assert_eq!(d.state.risk.snapshot().consecutive_losses, 0);
    }

    #[tokio::test]
    async fn paused_state_skips_strategy_evaluation() {
        let mut d = test_dispatcher();
        *d.state.trading_state.write() = TradingState::Paused;
        d.handle_book_event(book_event("a", 0.50, 0.52)).await;
        assert_eq!(d.state.tracker.open_order_count(), 0);
        assert!(d.book.get("a").is_some());
    }

    #[tokio::test]
    async fn second_book_update_cancels_prior_quotes_before_placing_new_ones() {
        let mut d = test_dispatcher();
        d.handle_book_event(book_event("a", 0.50, 0.52)).await;
        let first_ids: Vec<String> = d.active_orders["a"].clone();
        d.handle_book_event(book_event("a", 0.48, 0.50)).await;
        for id in &first_ids {
            assert_eq!(d.state.tracker.order(id).unwrap().status, OrderStatus::Canceled);
        }
        assert_eq!(d.state.tracker.open_order_count(), 2);
    }

    #[tokio::test]
    async fn convergence_arb_buys_both_legs_when_underpriced() {
        let mut config = Config::default();
        config.trading_mode = TradingMode::Paper;
        config.taker.amount_usdc = 20.0;
        config.taker.min_convergence_bps = 10.0;
        config.risk.max_open_orders = 20;
        let selector = Arc::new(StaticMarketSelector::new(&config.selector));
        let state = Arc::new(AppState::new(config, Arc::new(LoggingNotifier)));
        *state.trading_state.write() = TradingState::Running;
        let mut d = Dispatcher::new(state, None, Arc::new(crate::venue::UnconfiguredSigner), selector);
        d.register_market("m1".to_string(), "yes".to_string(), "no".to_string());

        d.book.update(book_event("yes", 0.39, 0.40));
        d.book.update(book_event("no", 0.54, 0.55));
        d.evaluate_convergence("yes", "no").await;

        assert_eq!(d.state.tracker.open_order_count(), 2);
    }

    #[tokio::test]
    async fn daily_reset_rebaselines_and_clears_risk_state() {
        let mut d = test_dispatcher();
        d.state.risk.record_trade_result(-1.0);
        d.handle_daily_reset_tick();
        assert_eq!(d.state.risk.snapshot().consecutive_losses, 0);
    }
}
