//! Route discovery
//!
//! Swaps go through a best-route aggregator. The aggregator is a network call
//! whose only failure the builder recovers from is `NoRouteFound` (no path or
//! not enough liquidity); anything else is a build failure.

use crate::units::{coin_types, decimal};
use crate::{Error, Result};
use alloy::primitives::U256;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use url::Url;

/// One hop of a quoted route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePath {
    /// Pool id
    pub id: String,
    /// Liquidity provider name
    pub provider: String,
}

/// Quoted route for an exact-input swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteQuote {
    pub from: String,
    pub target: String,
    #[serde(with = "decimal")]
    pub amount_in: U256,
    #[serde(with = "decimal")]
    pub amount_out: U256,
    pub paths: Vec<RoutePath>,
    /// Price deviation reported by the aggregator
    pub deviation_ratio: f64,
}

impl RouteQuote {
    /// Output floor for a slippage fraction (0.01 = 1%)
    pub fn min_out(&self, slippage: f64) -> U256 {
        let bps = (slippage.clamp(0.0, 1.0) * 10_000.0).round() as u64;
        self.amount_out * U256::from(10_000 - bps) / U256::from(10_000u64)
    }
}

/// Finds exact-input routes between two coin types
#[async_trait]
pub trait RouteFinder: Send + Sync {
    /// Quote `amount_in` of `from` into `target`.
    ///
    /// Fails with `NoRouteFound` when no path exists or liquidity is short,
    /// and with `Router` when the lookup itself fails. The builder falls back
    /// on either.
    async fn find_route(&self, from: &str, target: &str, amount_in: U256) -> Result<RouteQuote>;

    /// Name for logging
    fn name(&self) -> &'static str;
}

/// Client for the Cetus aggregator `find_routes` endpoint
pub struct CetusAggregator {
    client: Client,
    endpoint: String,
}

impl CetusAggregator {
    pub fn new(endpoint: &str) -> Result<Self> {
        Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("Invalid aggregator endpoint {}: {}", endpoint, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Router(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn routes_url(&self, from: &str, target: &str, amount_in: U256) -> Result<Url> {
        let amount = amount_in.to_string();
        Url::parse_with_params(
            &format!("{}/find_routes", self.endpoint),
            &[
                ("from", from),
                ("target", target),
                ("amount", amount.as_str()),
                ("by_amount_in", "true"),
            ],
        )
        .map_err(|e| Error::Router(format!("Invalid route request: {}", e)))
    }
}

#[derive(Deserialize)]
struct FindRoutesResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<FindRoutesData>,
}

#[derive(Deserialize)]
struct FindRoutesData {
    #[serde(with = "decimal")]
    amount_in: U256,
    #[serde(with = "decimal")]
    amount_out: U256,
    #[serde(default)]
    paths: Vec<RawPath>,
    #[serde(default, deserialize_with = "lenient_f64")]
    deviation_ratio: f64,
    #[serde(default)]
    insufficient_liquidity: bool,
}

#[derive(Deserialize)]
struct RawPath {
    #[serde(default)]
    id: String,
    #[serde(default)]
    provider: String,
}

/// The aggregator renders ratios either as numbers or as strings
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[async_trait]
impl RouteFinder for CetusAggregator {
    async fn find_route(&self, from: &str, target: &str, amount_in: U256) -> Result<RouteQuote> {
        let url = self.routes_url(from, target, amount_in)?;
        tracing::debug!(from = from, target = target, amount_in = %amount_in, "Finding swap route");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Router(format!("Route request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Router(format!("Aggregator returned HTTP {}", status)));
        }

        let body: FindRoutesResponse = response
            .json()
            .await
            .map_err(|e| Error::Router(format!("Failed to parse route response: {}", e)))?;

        let no_route = || {
            Error::NoRouteFound(format!(
                "no swap route from {} to {} for amount {}",
                from, target, amount_in
            ))
        };

        if body.code != 200 {
            tracing::debug!(code = body.code, msg = %body.msg, "Aggregator reported no route");
            return Err(no_route());
        }
        let data = body.data.ok_or_else(no_route)?;
        if data.insufficient_liquidity {
            return Err(Error::NoRouteFound(format!(
                "insufficient liquidity from {} to {} for amount {}",
                from, target, amount_in
            )));
        }
        if data.paths.is_empty() || data.amount_out.is_zero() {
            return Err(no_route());
        }

        Ok(RouteQuote {
            from: from.to_string(),
            target: target.to_string(),
            amount_in: data.amount_in,
            amount_out: data.amount_out,
            paths: data
                .paths
                .into_iter()
                .map(|p| RoutePath {
                    id: p.id,
                    provider: p.provider,
                })
                .collect(),
            deviation_ratio: data.deviation_ratio,
        })
    }

    fn name(&self) -> &'static str {
        "cetus"
    }
}

/// Offline router quoting SUI against one stable coin at a fixed price.
///
/// Used by the demo mode and by tests. A liquidity ceiling makes larger
/// inputs fail with `NoRouteFound`.
#[derive(Debug, Clone)]
pub struct FixedRateRouter {
    /// Stable coin type priced against SUI
    stable_coin: String,
    /// Stable units per SUI, scaled by 10^6
    rate_e6: U256,
    /// Largest accepted input, in the input coin's units
    liquidity: Option<U256>,
}

impl FixedRateRouter {
    /// `price` is how many stable coins one SUI buys.
    pub fn new(stable_coin: &str, price: f64) -> Self {
        let rate = (price.max(0.0) * 1_000_000.0).round() as u64;
        Self {
            stable_coin: stable_coin.to_string(),
            rate_e6: U256::from(rate),
            liquidity: None,
        }
    }

    pub fn with_liquidity(mut self, max_amount_in: U256) -> Self {
        self.liquidity = Some(max_amount_in);
        self
    }

    fn quote_out(&self, from: &str, target: &str, amount_in: U256) -> Option<U256> {
        let mist_per_sui = U256::from(1_000_000_000u64);
        if from == coin_types::SUI && target == self.stable_coin {
            // MIST * (USDC micro-units per SUI) / MIST per SUI
            Some(amount_in * self.rate_e6 / mist_per_sui)
        } else if from == self.stable_coin && target == coin_types::SUI && !self.rate_e6.is_zero() {
            Some(amount_in * mist_per_sui / self.rate_e6)
        } else {
            None
        }
    }
}

#[async_trait]
impl RouteFinder for FixedRateRouter {
    async fn find_route(&self, from: &str, target: &str, amount_in: U256) -> Result<RouteQuote> {
        if let Some(limit) = self.liquidity {
            if amount_in > limit {
                return Err(Error::NoRouteFound(format!(
                    "insufficient liquidity from {} to {} for amount {}",
                    from, target, amount_in
                )));
            }
        }

        let amount_out = self
            .quote_out(from, target, amount_in)
            .filter(|out| !out.is_zero())
            .ok_or_else(|| {
                Error::NoRouteFound(format!(
                    "no swap route from {} to {} for amount {}",
                    from, target, amount_in
                ))
            })?;

        Ok(RouteQuote {
            from: from.to_string(),
            target: target.to_string(),
            amount_in,
            amount_out,
            paths: vec![RoutePath {
                id: "fixed-rate".to_string(),
                provider: "FIXED".to_string(),
            }],
            deviation_ratio: 0.0,
        })
    }

    fn name(&self) -> &'static str {
        "fixed_rate"
    }
}
