use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::batch::{chunked, run_batches, FailurePolicy};
use crate::cache::Cache;
use crate::error::{PortfolioError, Result};
use crate::limiter::RateLimiter;
use crate::queue::{JobHandler, JobQueue};
use crate::retry::RetryPolicy;

mod token_list;
pub use token_list::TokenListSource;

pub const METADATA_JOB: &str = "process-metadata";

/// Display metadata for one mint. Absent upstream fields come back as empty
/// strings / None, never as missing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub image: Option<String>,
}

/// On-chain fields common to every record kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordInfo {
    pub mint: String,
    pub name: String,
    pub symbol: String,
}

/// Upstream record kinds. Only plain `Metadata` records carry loadable token
/// metadata; NFT and semi-fungible records are filtered out, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataRecord {
    Metadata(RecordInfo),
    Nft(RecordInfo),
    Sft(RecordInfo),
}

/// Extended off-chain JSON fields, preferred over the on-chain ones when set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OffchainMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedMetadata {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub json: Option<OffchainMetadata>,
}

/// Boundary to the token metadata upstream. The program/account layout behind
/// it is opaque to this crate.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn find_by_mint_list(&self, mints: &[String]) -> Result<Vec<MetadataRecord>>;
    async fn load(&self, record: &RecordInfo) -> Result<LoadedMetadata>;
}

/// Resolves one batch of mints directly against the source: list the records,
/// load the plain metadata ones, and fold on-chain/off-chain fields together.
pub(crate) async fn fetch_metadata_batch(
    source: &dyn MetadataSource,
    mints: &[String],
) -> Result<Vec<TokenMetadata>> {
    let records = source.find_by_mint_list(mints).await?;

    let loads = records.iter().filter_map(|record| match record {
        MetadataRecord::Metadata(info) => Some(source.load(info)),
        MetadataRecord::Nft(_) | MetadataRecord::Sft(_) => None,
    });

    let mut tokens = Vec::new();
    for loaded in join_all(loads).await {
        let loaded = loaded?;
        let json = loaded.json.unwrap_or_default();
        tokens.push(TokenMetadata {
            mint: loaded.mint,
            name: json.name.unwrap_or(loaded.name),
            symbol: json.symbol.unwrap_or(loaded.symbol),
            image: json.image,
        });
    }
    Ok(tokens)
}

/// Whether batches resolve inline or through the job queue. The fetcher's
/// callers never see the difference.
#[derive(Clone)]
pub enum ExecutionMode {
    Direct,
    Queued(Arc<dyn JobQueue>),
}

pub struct MetadataFetcher {
    source: Arc<dyn MetadataSource>,
    cache: Cache,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    batch_size: usize,
    failure_policy: FailurePolicy,
    mode: ExecutionMode,
}

impl MetadataFetcher {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        cache: Cache,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        batch_size: usize,
        failure_policy: FailurePolicy,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            source,
            cache,
            limiter,
            retry,
            batch_size,
            failure_policy,
            mode,
        }
    }

    /// Resolves display metadata for the given mints. Results follow batch
    /// order, not input order; mints with no resolvable record are absent.
    pub async fn get_token_metadata(&self, mints: &[String]) -> Result<Vec<TokenMetadata>> {
        let started = Instant::now();
        info!("Starting to fetch metadata for {} mints", mints.len());

        let batches = chunked(mints, self.batch_size);
        let result = run_batches(batches, self.failure_policy, |batch| {
            self.resolve_batch(batch)
        })
        .await;

        match result {
            Ok(tokens) => {
                info!(
                    "Fetched metadata for {} mints in {} ms",
                    tokens.len(),
                    started.elapsed().as_millis()
                );
                Ok(tokens)
            }
            Err(e) => {
                error!("Failed to fetch metadata for mints: {}", mints.join(", "));
                Err(e)
            }
        }
    }

    /// Cache-first resolution of one batch: collect hits, dispatch the misses
    /// as a single upstream call, write fresh entries through.
    async fn resolve_batch(&self, batch: Vec<String>) -> Result<Vec<TokenMetadata>> {
        let probes = batch.iter().map(|mint| {
            let key = cache_key(mint);
            async move { self.cache.get_json::<TokenMetadata>(&key).await }
        });

        let mut resolved = Vec::new();
        let mut misses = Vec::new();
        for (mint, probe) in batch.iter().zip(join_all(probes).await) {
            match probe {
                Some(hit) => resolved.push(hit),
                None => misses.push(mint.clone()),
            }
        }

        if misses.is_empty() {
            return Ok(resolved);
        }

        // One limiter token per dispatched batch, not per mint.
        self.limiter.acquire().await;
        let fresh = self
            .retry
            .run(|| self.dispatch(&misses))
            .await
            .map_err(|e| PortfolioError::upstream_batch(e.to_string(), &misses))?;

        for token in &fresh {
            self.cache.set_json(&cache_key(&token.mint), token).await?;
        }
        resolved.extend(fresh);
        Ok(resolved)
    }

    async fn dispatch(&self, mints: &[String]) -> Result<Vec<TokenMetadata>> {
        match &self.mode {
            ExecutionMode::Direct => fetch_metadata_batch(self.source.as_ref(), mints).await,
            ExecutionMode::Queued(queue) => {
                debug!("Submitting metadata job for {} mints", mints.len());
                let handle = queue
                    .enqueue(METADATA_JOB, json!({ "mints": mints }))
                    .await?;
                let outcome = queue.await_completion(handle).await?;
                Ok(serde_json::from_value(outcome)?)
            }
        }
    }
}

fn cache_key(mint: &str) -> String {
    format!("metadata-{}", mint)
}

/// Queue-side worker for [`METADATA_JOB`]: a plain batch fetch, retried by the
/// submitting fetcher rather than here.
pub struct MetadataJobHandler {
    source: Arc<dyn MetadataSource>,
}

impl MetadataJobHandler {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl JobHandler for MetadataJobHandler {
    async fn run(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        let mints: Vec<String> = serde_json::from_value(payload["mints"].clone())
            .map_err(|e| PortfolioError::Queue(format!("invalid metadata job payload: {}", e)))?;
        let tokens = fetch_metadata_batch(self.source.as_ref(), &mints).await?;
        Ok(serde_json::to_value(tokens)?)
    }
}
