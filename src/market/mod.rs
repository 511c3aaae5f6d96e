//! Market snapshots
//!
//! The aggregator is an AMM router, not an order book, so the snapshot probes
//! a 1 SUI swap for the mid price and derives a synthetic three-level book
//! around it. Any upstream failure degrades to a fixed fallback book.

use crate::clock::{Clock, SystemClock};
use crate::ptb::RouteFinder;
use crate::units::{self, USDC_DECIMALS};
use crate::Result;
use alloy::primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pair label carried on every snapshot
pub const DEFAULT_PAIR: &str = "SUI_USDC";

const FALLBACK_MID_PRICE: f64 = 1.5;
const FALLBACK_SPREAD: f64 = 0.005;
const SYNTHETIC_SPREAD: f64 = 0.003;
const LEVEL_STEPS: [f64; 3] = [0.0, 0.005, 0.01];
const LEVEL_QUANTITIES: [f64; 3] = [500.0, 1000.0, 2000.0];

/// Where a snapshot's prices came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSource {
    Live,
    Fallback,
}

impl MarketSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketSource::Live => "live",
            MarketSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Point-in-time view of the SUI/USDC market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub pair: String,
    pub mid_price: f64,
    /// Best bid first
    pub bid_levels: Vec<PriceLevel>,
    /// Best ask first
    pub ask_levels: Vec<PriceLevel>,
    /// Milliseconds since epoch
    pub timestamp: u64,
    pub source: MarketSource,
}

impl MarketSnapshot {
    fn with_spread(
        pair: &str,
        mid_price: f64,
        spread: f64,
        source: MarketSource,
        timestamp: u64,
    ) -> Self {
        let half_spread = mid_price * spread * 0.5;
        let best_bid = mid_price - half_spread;
        let best_ask = mid_price + half_spread;

        let levels = |best: f64, sign: f64| -> Vec<PriceLevel> {
            LEVEL_STEPS
                .iter()
                .zip(LEVEL_QUANTITIES)
                .map(|(step, quantity)| PriceLevel {
                    price: best + sign * step,
                    quantity,
                })
                .collect()
        };

        Self {
            pair: pair.to_string(),
            mid_price,
            bid_levels: levels(best_bid, -1.0),
            ask_levels: levels(best_ask, 1.0),
            timestamp,
            source,
        }
    }

    /// Synthetic book around a live mid price, stamped at `timestamp` (ms)
    pub fn synthetic(pair: &str, mid_price: f64, timestamp: u64) -> Self {
        Self::with_spread(pair, mid_price, SYNTHETIC_SPREAD, MarketSource::Live, timestamp)
    }

    /// Fixed book used whenever live data is unavailable
    pub fn fallback(pair: &str, timestamp: u64) -> Self {
        Self::with_spread(
            pair,
            FALLBACK_MID_PRICE,
            FALLBACK_SPREAD,
            MarketSource::Fallback,
            timestamp,
        )
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bid_levels.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.ask_levels.first()
    }
}

/// Source of market snapshots
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Snapshot for the agent at `probe_address`.
    async fn snapshot(&self, probe_address: &str) -> Result<MarketSnapshot>;
}

/// Prices SUI/USDC by probing the route aggregator
pub struct AggregatorMarketFeed {
    router: Arc<dyn RouteFinder>,
    sui: String,
    usdc: String,
    pair: String,
    clock: Arc<dyn Clock>,
}

impl AggregatorMarketFeed {
    pub fn new(router: Arc<dyn RouteFinder>, sui: &str, usdc: &str) -> Self {
        Self {
            router,
            sui: sui.to_string(),
            usdc: usdc.to_string(),
            pair: DEFAULT_PAIR.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamp snapshots with a shared clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn live_mid_price(&self) -> Result<Option<f64>> {
        let probe = U256::from(1_000_000_000u64);
        let quote = self.router.find_route(&self.sui, &self.usdc, probe).await?;
        let mid: f64 = units::format_units(quote.amount_out, USDC_DECIMALS)
            .parse()
            .unwrap_or(0.0);
        Ok((mid > 0.0).then_some(mid))
    }
}

#[async_trait]
impl MarketFeed for AggregatorMarketFeed {
    async fn snapshot(&self, _probe_address: &str) -> Result<MarketSnapshot> {
        let now = self.clock.now_ms();
        match self.live_mid_price().await {
            Ok(Some(mid)) => Ok(MarketSnapshot::synthetic(&self.pair, mid, now)),
            Ok(None) => {
                tracing::warn!(router = self.router.name(), "Zero price quoted, using fallback market data");
                Ok(MarketSnapshot::fallback(&self.pair, now))
            }
            Err(e) => {
                tracing::warn!(router = self.router.name(), error = %e, "Price probe failed, using fallback market data");
                Ok(MarketSnapshot::fallback(&self.pair, now))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ptb::FixedRateRouter;
    use crate::units::coin_types;

    const NOW: u64 = 1_700_000_000_000;

    fn feed(router: FixedRateRouter) -> AggregatorMarketFeed {
        AggregatorMarketFeed::new(Arc::new(router), coin_types::SUI, coin_types::USDC_TESTNET)
            .with_clock(Arc::new(FixedClock::new(NOW)))
    }

    #[tokio::test]
    async fn test_live_snapshot_from_quote() {
        let snapshot = feed(FixedRateRouter::new(coin_types::USDC_TESTNET, 2.0))
            .snapshot("0xagent")
            .await
            .unwrap();

        assert_eq!(snapshot.source, MarketSource::Live);
        assert_eq!(snapshot.timestamp, NOW);
        assert!((snapshot.mid_price - 2.0).abs() < 1e-9);
        let bid = snapshot.best_bid().unwrap();
        let ask = snapshot.best_ask().unwrap();
        assert!((bid.price - 1.997).abs() < 1e-9);
        assert!((ask.price - 2.003).abs() < 1e-9);
        assert_eq!(snapshot.bid_levels.len(), 3);
        assert!((snapshot.bid_levels[2].price - 1.987).abs() < 1e-9);
        assert_eq!(snapshot.ask_levels[1].quantity, 1000.0);
    }

    #[tokio::test]
    async fn test_probe_failure_degrades_to_fallback() {
        let snapshot = feed(FixedRateRouter::new(coin_types::USDC_TESTNET, 2.0).with_liquidity(U256::ZERO))
            .snapshot("0xagent")
            .await
            .unwrap();

        assert_eq!(snapshot.source, MarketSource::Fallback);
        assert_eq!(snapshot.timestamp, NOW);
        assert_eq!(snapshot.mid_price, 1.5);
        assert!((snapshot.best_bid().unwrap().price - 1.49625).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_zero_price_degrades_to_fallback() {
        let snapshot = feed(FixedRateRouter::new(coin_types::USDC_TESTNET, 0.0))
            .snapshot("0xagent")
            .await
            .unwrap();
        assert_eq!(snapshot.source, MarketSource::Fallback);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json = serde_json::to_value(MarketSnapshot::fallback(DEFAULT_PAIR, NOW)).unwrap();
        assert_eq!(json["timestamp"], NOW);
        assert_eq!(json["source"], "fallback");
        assert_eq!(json["pair"], "SUI_USDC");
        assert!(json["bidLevels"].is_array());
    }
}
