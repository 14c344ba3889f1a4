// =============================================================================
// Configuration — recognized option schema, env overrides, validation (§6, §10.3)
// =============================================================================
//
// Follows `runtime_config.rs`'s pattern: every field carries `#[serde(default)]`
// so older or partial JSON on disk still deserializes; `Config::load` falls
// back to `Config::default()` with a logged warning; `Config::save` persists
// via an atomic tmp-file-then-rename. Deep configuration-loading machinery
// (layered file/env precedence, hot-reload) is out of scope per §1 — this is
// a single load-at-startup `Config`, not a watched multi-source layer.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::crypto::CryptoConfig;
use crate::paper::PaperConfig;
use crate::risk::RiskConfig;
use crate::strategy::{MakerConfig, TakerConfig};
use crate::types::{AssetId, RolloutPhase, TradingMode};

fn default_scan_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_builder_sync_interval() -> Duration {
    Duration::from_secs(300)
}

/// Market-selection tunables. Only `markets` and the rescan cadence are
/// actually consumed (by `StaticMarketSelector`, §10.7) — the
/// liquidity/volume/spread fields are recognized per §6 but not evaluated
/// against a real market-metadata API, which is the out-of-scope collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default)]
    pub markets: Vec<AssetId>,
    #[serde(default = "default_rescan_interval", with = "crate::types::duration_secs")]
    pub rescan_interval: Duration,
    #[serde(default)]
    pub min_liquidity: f64,
    #[serde(default)]
    pub min_volume_24hr: f64,
    #[serde(default)]
    pub max_spread: f64,
    #[serde(default)]
    pub min_days_to_end: f64,
}

fn default_rescan_interval() -> Duration {
    Duration::from_secs(300)
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            markets: Vec::new(),
            rescan_interval: default_rescan_interval(),
            min_liquidity: 0.0,
            min_volume_24hr: 0.0,
            max_spread: 0.0,
            min_days_to_end: 0.0,
        }
    }
}

/// Top-level configuration. Every tunable named in spec.md §6 lives here so
/// the engine can be reconfigured without touching code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trading_mode: TradingMode,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_scan_interval", with = "crate::types::duration_secs")]
    pub scan_interval: Duration,
    #[serde(default = "default_heartbeat_interval", with = "crate::types::duration_secs")]
    pub heartbeat_interval: Duration,
    #[serde(default = "default_builder_sync_interval", with = "crate::types::duration_secs")]
    pub builder_sync_interval: Duration,
    #[serde(default)]
    pub rollout_phase: RolloutPhase,

    #[serde(default)]
    pub maker: MakerConfig,
    #[serde(default)]
    pub taker: TakerConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paper,
            dry_run: false,
            scan_interval: default_scan_interval(),
            heartbeat_interval: default_heartbeat_interval(),
            builder_sync_interval: default_builder_sync_interval(),
            rollout_phase: RolloutPhase::Paper,
            maker: MakerConfig::default(),
            taker: TakerConfig::default(),
            risk: RiskConfig::default(),
            paper: PaperConfig::default(),
            selector: SelectorConfig::default(),
            crypto: CryptoConfig::default(),
        }
    }
}

/// Fatal-at-startup validation failures (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid configuration: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load from a JSON file at `path`. Falls back to `Config::default()`
    /// with a logged warning on any read/parse failure, matching
    /// `RuntimeConfig::load`'s caller contract in `main.rs`.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(cfg) => {
                info!(path = %path.display(), trading_mode = %cfg.trading_mode, "config loaded");
                cfg
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        Ok(cfg)
    }

    /// Persist via an atomic tmp-file-then-rename, matching
    /// `runtime_config::save`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;
        info!(path = %path.display(), "config saved (atomic)");
        Ok(())
    }

    /// Apply environment overrides, after load and before validation — same
    /// ordering `main.rs` applies its `AURORA_SYMBOLS` override.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DRY_RUN") {
            self.dry_run = parse_bool(&v).unwrap_or(self.dry_run);
        }
        if let Ok(v) = std::env::var("TRADING_MODE") {
            self.trading_mode = match v.to_lowercase().as_str() {
                "live" => TradingMode::Live,
                "paper" => TradingMode::Paper,
                other => {
                    warn!(value = %other, "unrecognized TRADING_MODE override, ignoring");
                    self.trading_mode
                }
            };
        }
        if let Ok(v) = std::env::var("PAPER_ALLOW_SHORT") {
            if let Some(b) = parse_bool(&v) {
                self.paper.allow_short = b;
            }
        }
    }

    /// Clamp specific fields per the configured rollout phase (§6). Applied
    /// as a final pass over the loaded config, after validation.
    pub fn apply_rollout_clamps(&mut self) {
        match self.rollout_phase {
            RolloutPhase::Paper | RolloutPhase::Shadow => {}
            RolloutPhase::LiveSmall => {
                self.risk.max_open_orders = self.risk.max_open_orders.min(4);
                self.maker.order_size_usdc = self.maker.order_size_usdc.min(1.0);
                self.taker.amount_usdc = self.taker.amount_usdc.min(1.0);
            }
            RolloutPhase::Live => {}
        }
    }

    /// Reject out-of-range values at startup — fatal per §7.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maker.min_spread_bps < 0.0 {
            return Err(ConfigError("maker.min_spread_bps must be >= 0".into()));
        }
        if self.maker.spread_multiplier <= 0.0 {
            return Err(ConfigError("maker.spread_multiplier must be > 0".into()));
        }
        if self.maker.order_size_usdc < 0.0 {
            return Err(ConfigError("maker.order_size_usdc must be >= 0".into()));
        }
        if self.taker.min_imbalance < 0.0 || self.taker.min_imbalance > 1.0 {
            return Err(ConfigError("taker.min_imbalance must be in [0,1]".into()));
        }
        if self.taker.amount_usdc < 0.0 {
            return Err(ConfigError("taker.amount_usdc must be >= 0".into()));
        }
        if self.risk.max_daily_loss_pct < 0.0 || self.risk.max_daily_loss_pct > 1.0 {
            return Err(ConfigError("risk.max_daily_loss_pct must be in [0,1]".into()));
        }
        if self.risk.max_drawdown_pct < 0.0 || self.risk.max_drawdown_pct > 1.0 {
            return Err(ConfigError("risk.max_drawdown_pct must be in [0,1]".into()));
        }
        if self.paper.initial_balance_usdc <= 0.0 {
            return Err(ConfigError("paper.initial_balance_usdc must be > 0".into()));
        }
        if self.paper.fee_bps < 0.0 || self.paper.slippage_bps < 0.0 {
            return Err(ConfigError("paper.fee_bps and paper.slippage_bps must be >= 0".into()));
        }
        Ok(())
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.trading_mode, TradingMode::Paper);
        assert!(!cfg.dry_run);
        assert_eq!(cfg.risk.max_open_orders, 0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paper);
        assert_eq!(cfg.scan_interval, Duration::from_secs(60));
    }

    #[test]
    fn deserialize_partial_json_fills_defaults() {
        let json = r#"{ "trading_mode": "Live", "maker": { "enabled": true } }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert!(cfg.maker.enabled);
        assert_eq!(cfg.maker.min_spread_bps, 0.0);
    }

    #[test]
    fn roundtrip_serialization() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.trading_mode, cfg2.trading_mode);
        assert_eq!(cfg.scan_interval, cfg2.scan_interval);
    }

    #[test]
    fn env_override_dry_run_and_trading_mode() {
        std::env::set_var("DRY_RUN", "true");
        std::env::set_var("TRADING_MODE", "live");
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        assert!(cfg.dry_run);
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        std::env::remove_var("DRY_RUN");
        std::env::remove_var("TRADING_MODE");
    }

    #[test]
    fn live_small_rollout_clamps_sizes_and_open_orders() {
        let mut cfg = Config {
            rollout_phase: RolloutPhase::LiveSmall,
            ..Config::default()
        };
        cfg.risk.max_open_orders = 20;
        cfg.maker.order_size_usdc = 25.0;
        cfg.taker.amount_usdc = 25.0;
        cfg.apply_rollout_clamps();
        assert_eq!(cfg.risk.max_open_orders, 4);
        assert_eq!(cfg.maker.order_size_usdc, 1.0);
        assert_eq!(cfg.taker.amount_usdc, 1.0);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = Config::default();
        cfg.taker.min_imbalance = 1.5;
        assert!(cfg.validate().is_err());
    }
}
