// =============================================================================
// Market Selector — rescan-tick contract (§4.9 item 9, §10.7)
// =============================================================================
//
// Liquidity/volume/spread filtering against real market metadata is the
// out-of-scope external collaborator named in §1. `StaticMarketSelector`
// satisfies the contract — a list of asset ids the dispatcher diffs against
// its current subscription set — without reimplementing that filtering.
// =============================================================================

use crate::config::SelectorConfig;
use crate::types::AssetId;

pub trait MarketSelector: Send + Sync {
    fn select(&self) -> Vec<AssetId>;
}

/// Returns the configured asset list unchanged on every call.
pub struct StaticMarketSelector {
    markets: Vec<AssetId>,
}

impl StaticMarketSelector {
    pub fn new(config: &SelectorConfig) -> Self {
        Self {
            markets: config.markets.clone(),
        }
    }
}

impl MarketSelector for StaticMarketSelector {
    fn select(&self) -> Vec<AssetId> {
        self.markets.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_configured_markets_unchanged() {
        let cfg = SelectorConfig {
            markets: vec!["a".into(), "b".into()],
            ..SelectorConfig::default()
        };
        let sel = StaticMarketSelector::new(&cfg);
        assert_eq!(sel.select(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sel.select(), vec!["a".to_string(), "b".to_string()]);
    }
}
