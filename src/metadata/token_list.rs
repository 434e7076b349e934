use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{PortfolioError, Result};

use super::{LoadedMetadata, MetadataRecord, MetadataSource, OffchainMetadata, RecordInfo};

#[derive(Debug, Clone, Deserialize)]
struct TokenListEntry {
    address: String,
    name: String,
    symbol: String,
    #[serde(rename = "logoURI")]
    logo_uri: Option<String>,
}

/// Metadata source backed by a hosted token-list endpoint. The full list is
/// fetched once per process and held in memory keyed by mint.
pub struct TokenListSource {
    client: reqwest::Client,
    list_url: String,
    entries: Arc<RwLock<Option<HashMap<String, TokenListEntry>>>>,
}

impl TokenListSource {
    pub fn new(client: reqwest::Client, list_url: impl Into<String>) -> Self {
        Self {
            client,
            list_url: list_url.into(),
            entries: Arc::new(RwLock::new(None)),
        }
    }

    async fn ensure_list(&self) -> Result<()> {
        if self.entries.read().await.is_some() {
            return Ok(());
        }

        debug!("Fetching token list from {}", self.list_url);
        let response = self.client.get(&self.list_url).send().await?;
        if !response.status().is_success() {
            return Err(PortfolioError::Http {
                status: response.status().as_u16(),
                message: format!("token list fetch from {} failed", self.list_url),
                retry_after_secs: None,
            });
        }

        let list: Vec<TokenListEntry> = response.json().await?;
        info!("Loaded token list with {} entries", list.len());
        let by_mint = list
            .into_iter()
            .map(|entry| (entry.address.clone(), entry))
            .collect();
        *self.entries.write().await = Some(by_mint);
        Ok(())
    }
}

#[async_trait]
impl MetadataSource for TokenListSource {
    async fn find_by_mint_list(&self, mints: &[String]) -> Result<Vec<MetadataRecord>> {
        self.ensure_list().await?;
        let entries = self.entries.read().await;
        let Some(entries) = entries.as_ref() else {
            return Err(PortfolioError::Internal("token list not loaded".to_string()));
        };

        Ok(mints
            .iter()
            .filter_map(|mint| entries.get(mint))
            .map(|entry| {
                MetadataRecord::Metadata(RecordInfo {
                    mint: entry.address.clone(),
                    name: entry.name.clone(),
                    symbol: entry.symbol.clone(),
                })
            })
            .collect())
    }

    async fn load(&self, record: &RecordInfo) -> Result<LoadedMetadata> {
        let entries = self.entries.read().await;
        let image = entries
            .as_ref()
            .and_then(|map| map.get(&record.mint))
            .and_then(|entry| entry.logo_uri.clone());

        Ok(LoadedMetadata {
            mint: record.mint.clone(),
            name: record.name.clone(),
            symbol: record.symbol.clone(),
            json: Some(OffchainMetadata {
                name: None,
                symbol: None,
                image,
            }),
        })
    }
}
