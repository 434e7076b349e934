use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{PortfolioError, Result};

use super::{CoinListEntry, PriceApi, PricePoint};

const API_KEY_HEADER: &str = "x-cg-pro-api-key";

/// CoinGecko-compatible price oracle client.
pub struct CoinGeckoClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl CoinGeckoClient {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Maps non-success responses into the domain error, carrying the
    /// Retry-After hint on throttling so the retry policy can honor it.
    async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        Err(PortfolioError::Http {
            status: status.as_u16(),
            message: format!("{} returned {}", context, status),
            retry_after_secs,
        })
    }
}

#[async_trait]
impl PriceApi for CoinGeckoClient {
    async fn list_coins(&self) -> Result<Vec<CoinListEntry>> {
        let url = format!("{}/coins/list", self.api_url);
        debug!("Fetching full coin listing from {}", url);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let response = Self::check(response, "coins/list").await?;
        Ok(response.json().await?)
    }

    async fn simple_price(&self, ids: &[String]) -> Result<HashMap<String, PricePoint>> {
        let url = format!("{}/simple/price", self.api_url);
        let ids_param = ids.join(",");
        debug!("Fetching prices for ids: {}", ids_param);

        let response = self
            .client
            .get(&url)
            .query(&[("ids", ids_param.as_str()), ("vs_currencies", "usd")])
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let response = Self::check(response, "simple/price").await?;
        Ok(response.json().await?)
    }
}
