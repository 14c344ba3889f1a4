// =============================================================================
// Convergence Engine — Main Entry Point
// =============================================================================
//
// The engine starts Paused regardless of `config.trading_mode`; an operator
// must explicitly resume via the dashboard. Market-data streams (book,
// resolutions, crypto prices) always run against the real venue feed, even
// in Paper mode — Paper only changes how orders are filled, not where
// price data comes from.
// =============================================================================

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use convergence_engine::app_state::AppState;
use convergence_engine::config::Config;
use convergence_engine::dispatcher::{Dispatcher, DispatcherChannels};
use convergence_engine::notifier::{LoggingNotifier, NotificationEvent};
use convergence_engine::selector::StaticMarketSelector;
use convergence_engine::types::TradingState;
use convergence_engine::venue::{UnconfiguredSigner, Venue, VenueClient};

const CONFIG_PATH: &str = "config.json";
const CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("convergence engine starting up");

    let mut config = Config::load(CONFIG_PATH);
    config.apply_env_overrides();
    config.apply_rollout_clamps();
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration, refusing to start");
        anyhow::bail!(e);
    }

    info!(
        trading_mode = %config.trading_mode,
        rollout_phase = ?config.rollout_phase,
        "configuration loaded — engine starts PAUSED regardless of trading_mode"
    );

    let notifier = Arc::new(LoggingNotifier);
    let state = Arc::new(AppState::new(config.clone(), notifier.clone()));

    {
        let flow = state.flow.clone();
        let notify = notifier.clone();
        state.tracker.set_on_fill(Arc::new(move |fill| {
            flow.record(&fill.asset_id, fill.side, fill.size, fill.price, fill.timestamp);
            notify.notify(&NotificationEvent::Fill(fill.clone()));
        }));
    }

    let base_url = std::env::var("VENUE_BASE_URL").unwrap_or_else(|_| "https://clob.example.invalid".into());
    let ws_url = std::env::var("VENUE_WS_URL").unwrap_or_else(|_| "wss://ws.example.invalid".into());
    let api_key = std::env::var("VENUE_API_KEY").unwrap_or_default();
    let venue: Arc<dyn Venue> = Arc::new(VenueClient::new(base_url, ws_url, api_key));

    let signer = Arc::new(UnconfiguredSigner);
    let selector = Arc::new(StaticMarketSelector::new(&config.selector));

    let mut dispatcher = Dispatcher::new(state.clone(), Some(venue.clone()), signer, selector);

    // The venue's signed pairing between a market's YES/NO legs isn't part
    // of the wire contract this crate models (§1) — markets are configured
    // as consecutive (yes, no) pairs in `selector.markets`.
    let markets = config.selector.markets.clone();
    for (i, pair) in markets.chunks(2).enumerate() {
        if let [yes, no] = pair {
            dispatcher.register_market(format!("market-{i}"), yes.clone(), no.clone());
        } else {
            warn!("selector.markets has an odd entry with no counterpart — convergence arbitrage skipped for it");
        }
    }

    let (book_tx, book_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (order_tx, order_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (trade_tx, trade_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (resolution_tx, resolution_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (crypto_tx, crypto_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Orderbook stream: always resubscribes on close, per §7.
    {
        let venue = venue.clone();
        let assets = markets.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = venue.run_orderbook_stream(&assets, book_tx.clone()).await {
                    error!(error = %e, "orderbook stream error — reconnecting in 2s");
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        });
    }

    // User-order / user-trade streams: single attempt, no auto-resubscribe.
    {
        let venue = venue.clone();
        let assets = markets.clone();
        tokio::spawn(async move {
            if let Err(e) = venue.run_user_orders_stream(&assets, order_tx).await {
                error!(error = %e, "user-order stream ended");
            }
        });
    }
    {
        let venue = venue.clone();
        let assets = markets.clone();
        tokio::spawn(async move {
            if let Err(e) = venue.run_user_trades_stream(&assets, trade_tx).await {
                error!(error = %e, "user-trade stream ended");
            }
        });
    }
    {
        let venue = venue.clone();
        let assets = markets.clone();
        tokio::spawn(async move {
            if let Err(e) = venue.run_market_resolutions_stream(&assets, resolution_tx).await {
                error!(error = %e, "market-resolution stream ended");
            }
        });
    }
    if !config.crypto.symbols.is_empty() {
        let venue = venue.clone();
        let symbols = config.crypto.symbols.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = venue.run_crypto_price_stream(&symbols, crypto_tx.clone()).await {
                    error!(error = %e, "crypto price stream error — reconnecting in 2s");
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        });
    }

    let bind_addr = std::env::var("ENGINE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8088".into());
    {
        let api_state = state.clone();
        tokio::spawn(async move {
            let app = convergence_engine::api::rest::router(api_state);
            let listener = tokio::net::TcpListener::bind(&bind_addr)
                .await
                .expect("failed to bind dashboard API");
            info!(addr = %bind_addr, "dashboard API listening");
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "dashboard API server stopped");
            }
        });
    }

    let dispatcher_handle = tokio::spawn(async move {
        let channels = DispatcherChannels {
            book_rx,
            order_rx,
            trade_rx,
            resolution_rx,
            crypto_rx,
            shutdown_rx,
        };
        if let Err(e) = dispatcher.run(channels).await {
            error!(error = %e, "dispatcher exited with error");
        }
    });

    info!("all subsystems running — engine is PAUSED, resume via POST /api/v1/control/resume");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received");

    *state.trading_state.write() = TradingState::Paused;
    let _ = shutdown_tx.send(true);
    let _ = dispatcher_handle.await;

    if let Err(e) = config.save(CONFIG_PATH) {
        error!(error = %e, "failed to save config on shutdown");
    }

    info!("convergence engine shut down complete");
    Ok(())
}
