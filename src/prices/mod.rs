use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::batch::{chunked, run_batches, FailurePolicy};
use crate::cache::Cache;
use crate::error::{PortfolioError, Result};
use crate::limiter::RateLimiter;
use crate::metadata::ExecutionMode;
use crate::queue::{JobHandler, JobQueue};
use crate::retry::RetryPolicy;

mod coingecko;
pub use coingecko::CoinGeckoClient;

pub const PRICES_JOB: &str = "fetch-prices";

const SYMBOL_MAP_KEY: &str = "symbol_to_id_map";

/// USD quote for one canonical id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub usd: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinListEntry {
    pub id: String,
    pub symbol: String,
}

/// Boundary to the price oracle's HTTP API.
#[async_trait]
pub trait PriceApi: Send + Sync {
    async fn list_coins(&self) -> Result<Vec<CoinListEntry>>;
    async fn simple_price(&self, ids: &[String]) -> Result<HashMap<String, PricePoint>>;
}

pub struct PriceFetcher {
    api: Arc<dyn PriceApi>,
    cache: Cache,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    batch_size: usize,
    mode: ExecutionMode,
    // Built once from the full coin listing; a rebuild replaces it wholesale.
    symbol_to_id: RwLock<HashMap<String, String>>,
}

impl PriceFetcher {
    pub fn new(
        api: Arc<dyn PriceApi>,
        cache: Cache,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        batch_size: usize,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            api,
            cache,
            limiter,
            retry,
            batch_size,
            mode,
            symbol_to_id: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves USD prices for the requested symbols, keyed by canonical id.
    /// Symbols with no canonical mapping are dropped; an empty mapping result
    /// returns an empty map without touching the upstream.
    pub async fn get_token_prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, PricePoint>> {
        let request_key = format!("token_prices_{}", symbols.join("_"));
        if let Some(cached) = self
            .cache
            .get_json::<HashMap<String, PricePoint>>(&request_key)
            .await
        {
            return Ok(cached);
        }

        self.ensure_symbol_map().await?;

        let ids: Vec<String> = {
            let map = self.symbol_to_id.read().await;
            symbols
                .iter()
                .filter_map(|symbol| map.get(&symbol.to_lowercase()).cloned())
                .collect()
        };

        if ids.is_empty() {
            warn!("No valid canonical ids found for the provided symbols");
            return Ok(HashMap::new());
        }
        debug!("Resolved canonical ids: {}", ids.join(", "));

        let pairs = run_batches(
            chunked(&ids, self.batch_size),
            FailurePolicy::FailFast,
            |chunk| self.resolve_batch(chunk),
        )
        .await?;

        let prices: HashMap<String, PricePoint> = pairs.into_iter().collect();
        self.cache.set_json(&request_key, &prices).await?;
        Ok(prices)
    }

    async fn resolve_batch(&self, ids: Vec<String>) -> Result<Vec<(String, PricePoint)>> {
        self.limiter.acquire().await;
        let prices = self
            .retry
            .run(|| self.dispatch(&ids))
            .await
            .map_err(|e| PortfolioError::upstream_batch(e.to_string(), &ids))?;
        Ok(prices.into_iter().collect())
    }

    async fn dispatch(&self, ids: &[String]) -> Result<HashMap<String, PricePoint>> {
        match &self.mode {
            ExecutionMode::Direct => self.api.simple_price(ids).await,
            ExecutionMode::Queued(queue) => {
                debug!("Submitting price job for {} ids", ids.len());
                let handle = queue.enqueue(PRICES_JOB, json!({ "tokenIds": ids })).await?;
                let outcome = queue.await_completion(handle).await?;
                Ok(serde_json::from_value(outcome)?)
            }
        }
    }

    /// Populates the symbol map on first use: cache first, then a full
    /// (rate-limited, retried) coin listing. Never refreshed mid-process.
    async fn ensure_symbol_map(&self) -> Result<()> {
        if !self.symbol_to_id.read().await.is_empty() {
            return Ok(());
        }

        if let Some(cached) = self
            .cache
            .get_json::<HashMap<String, String>>(SYMBOL_MAP_KEY)
            .await
        {
            *self.symbol_to_id.write().await = cached;
            return Ok(());
        }

        self.limiter.acquire().await;
        let coins = self.retry.run(|| self.api.list_coins()).await?;

        let map: HashMap<String, String> = coins
            .into_iter()
            .map(|coin| (coin.symbol.to_lowercase(), coin.id))
            .collect();
        debug!("Built symbol to id map with {} entries", map.len());

        self.cache.set_json(SYMBOL_MAP_KEY, &map).await?;
        *self.symbol_to_id.write().await = map;
        Ok(())
    }
}

/// Queue-side worker for [`PRICES_JOB`].
pub struct PriceJobHandler {
    api: Arc<dyn PriceApi>,
}

impl PriceJobHandler {
    pub fn new(api: Arc<dyn PriceApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl JobHandler for PriceJobHandler {
    async fn run(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        let ids: Vec<String> = serde_json::from_value(payload["tokenIds"].clone())
            .map_err(|e| PortfolioError::Queue(format!("invalid price job payload: {}", e)))?;
        let prices = self.api.simple_price(&ids).await?;
        Ok(serde_json::to_value(prices)?)
    }
}
