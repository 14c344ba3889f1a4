// =============================================================================
// Venue — abstract contract for the remote CLOB exchange (§6)
// =============================================================================
//
// The wire protocol, EIP-712 signing, and cryptographic identity are the
// out-of-scope external collaborator; this module only needs the shape of
// the contract to exist, and a non-cryptographic HTTP/WS client behind it.
// =============================================================================

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::book::{Book, BookEvent};
use crate::execution_tracker::{OrderEvent, TradeEvent};
use crate::types::{AssetId, MarketId};

pub use client::VenueClient;

/// A market-resolution event — all asset ids in a binary market resolve
/// together.
#[derive(Debug, Clone)]
pub struct ResolvedEvent {
    pub market: MarketId,
    pub question: String,
    pub asset_ids: Vec<AssetId>,
    pub winning_outcome: String,
}

/// A tick from the external-symbol crypto price stream.
#[derive(Debug, Clone, Copy)]
pub struct CryptoPriceEvent {
    pub value: f64,
    pub timestamp_millis: i64,
}

/// One market as returned by `Markets`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketInfo {
    pub condition_id: MarketId,
    pub tokens: Vec<TokenInfo>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenInfo {
    pub token_id: AssetId,
    pub outcome: String,
}

/// A request to build a signable order payload; the signature itself is
/// produced by the (out-of-scope) external signer, not this crate.
#[derive(Debug, Clone)]
pub struct SignableOrderRequest {
    pub asset_id: AssetId,
    pub side: crate::types::Side,
    pub price: f64,
    pub size: f64,
    pub order_type: OrderKind,
    /// Idempotency key the caller generates per placement attempt, so a
    /// retried signable build never collides with a prior one at the venue.
    pub client_order_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    /// Good-til-cancelled limit order.
    Gtc,
    /// Fill-and-kill market order.
    Fak,
}

/// An opaque, already-signed payload ready for `create_order_from_signable`.
#[derive(Debug, Clone)]
pub struct SignedOrder {
    pub payload: serde_json::Value,
}

/// Outcome of submitting a signed order.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub id: String,
    pub status: crate::types::OrderStatus,
}

/// Re-export the channel-event shapes the dispatcher selects over.
pub use BookEvent as VenueBookEvent;
pub use OrderEvent as VenueOrderEvent;
pub use TradeEvent as VenueTradeEvent;

/// Abstract contract for the remote CLOB exchange, per §6. `VenueClient`
/// implements the non-cryptographic parts (subscriptions, REST calls); the
/// dispatcher depends only on this trait so a different venue, or a test
/// double, can stand in.
#[async_trait]
pub trait Venue: Send + Sync {
    async fn markets(&self, active: bool, limit: u32) -> anyhow::Result<Vec<MarketInfo>>;
    async fn order_book(&self, token_id: &str) -> anyhow::Result<Book>;
    async fn fee_rate(&self, token_id: &str) -> anyhow::Result<f64>;
    async fn cancel_orders(&self, order_ids: &[String]) -> anyhow::Result<u32>;
    async fn cancel_market_orders(&self, market: &str) -> anyhow::Result<u32>;
    async fn cancel_all(&self) -> anyhow::Result<u32>;
    fn build_signable(&self, req: &SignableOrderRequest) -> serde_json::Value;
    async fn create_order_from_signable(&self, signed: &SignedOrder) -> anyhow::Result<PlacedOrder>;
    async fn heartbeat(&self) -> anyhow::Result<()>;
    async fn unsubscribe_market_assets(&self, ids: &[AssetId]) -> anyhow::Result<()>;

    async fn run_orderbook_stream(&self, asset_ids: &[AssetId], tx: mpsc::Sender<BookEvent>) -> anyhow::Result<()>;
    async fn run_user_orders_stream(&self, market_ids: &[MarketId], tx: mpsc::Sender<OrderEvent>) -> anyhow::Result<()>;
    async fn run_user_trades_stream(&self, market_ids: &[MarketId], tx: mpsc::Sender<TradeEvent>) -> anyhow::Result<()>;
    async fn run_market_resolutions_stream(&self, asset_ids: &[AssetId], tx: mpsc::Sender<ResolvedEvent>) -> anyhow::Result<()>;
    async fn run_crypto_price_stream(&self, symbols: &[String], tx: mpsc::Sender<(String, CryptoPriceEvent)>) -> anyhow::Result<()>;
}

#[async_trait]
impl Venue for VenueClient {
    async fn markets(&self, active: bool, limit: u32) -> anyhow::Result<Vec<MarketInfo>> {
        VenueClient::markets(self, active, limit).await
    }
    async fn order_book(&self, token_id: &str) -> anyhow::Result<Book> {
        VenueClient::order_book(self, token_id).await
    }
    async fn fee_rate(&self, token_id: &str) -> anyhow::Result<f64> {
        VenueClient::fee_rate(self, token_id).await
    }
    async fn cancel_orders(&self, order_ids: &[String]) -> anyhow::Result<u32> {
        VenueClient::cancel_orders(self, order_ids).await
    }
    async fn cancel_market_orders(&self, market: &str) -> anyhow::Result<u32> {
        VenueClient::cancel_market_orders(self, market).await
    }
    async fn cancel_all(&self) -> anyhow::Result<u32> {
        VenueClient::cancel_all(self).await
    }
    fn build_signable(&self, req: &SignableOrderRequest) -> serde_json::Value {
        VenueClient::build_signable(self, req)
    }
    async fn create_order_from_signable(&self, signed: &SignedOrder) -> anyhow::Result<PlacedOrder> {
        VenueClient::create_order_from_signable(self, signed).await
    }
    async fn heartbeat(&self) -> anyhow::Result<()> {
        VenueClient::heartbeat(self).await
    }
    async fn unsubscribe_market_assets(&self, ids: &[AssetId]) -> anyhow::Result<()> {
        VenueClient::unsubscribe_market_assets(self, ids).await
    }
    async fn run_orderbook_stream(&self, asset_ids: &[AssetId], tx: mpsc::Sender<BookEvent>) -> anyhow::Result<()> {
        VenueClient::run_orderbook_stream(self, asset_ids, tx).await
    }
    async fn run_user_orders_stream(&self, market_ids: &[MarketId], tx: mpsc::Sender<OrderEvent>) -> anyhow::Result<()> {
        VenueClient::run_user_orders_stream(self, market_ids, tx).await
    }
    async fn run_user_trades_stream(&self, market_ids: &[MarketId], tx: mpsc::Sender<TradeEvent>) -> anyhow::Result<()> {
        VenueClient::run_user_trades_stream(self, market_ids, tx).await
    }
    async fn run_market_resolutions_stream(&self, asset_ids: &[AssetId], tx: mpsc::Sender<ResolvedEvent>) -> anyhow::Result<()> {
        VenueClient::run_market_resolutions_stream(self, asset_ids, tx).await
    }
    async fn run_crypto_price_stream(&self, symbols: &[String], tx: mpsc::Sender<(String, CryptoPriceEvent)>) -> anyhow::Result<()> {
        VenueClient::run_crypto_price_stream(self, symbols, tx).await
    }
}

/// Produces a signature for an unsigned order payload. EIP-712 signing and
/// cryptographic identity are the out-of-scope external collaborator (§1);
/// no real implementation ships here. `UnconfiguredSigner` always errors,
/// which is the correct behavior for a live-mode run with no signer wired
/// up — it surfaces as a venue-call failure per §7, not a panic.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, unsigned_payload: serde_json::Value) -> anyhow::Result<SignedOrder>;
}

pub struct UnconfiguredSigner;

#[async_trait]
impl Signer for UnconfiguredSigner {
    async fn sign(&self, _unsigned_payload: serde_json::Value) -> anyhow::Result<SignedOrder> {
        anyhow::bail!("no signer configured — live order signing is an out-of-scope external collaborator")
    }
}
