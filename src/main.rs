mod balances;
mod batch;
mod cache;
mod config;
mod error;
mod limiter;
mod metadata;
mod monitoring;
mod portfolio;
mod prices;
mod queue;
mod retry;

use crate::balances::{BalanceResolver, SolanaLedger};
use crate::batch::FailurePolicy;
use crate::cache::{Cache, InMemoryCache};
use crate::config::Settings;
use crate::error::{PortfolioError, Result};
use crate::limiter::RateLimiter;
use crate::metadata::{
    ExecutionMode, MetadataFetcher, MetadataJobHandler, TokenListSource, METADATA_JOB,
};
use crate::monitoring::init_logging;
use crate::portfolio::PortfolioService;
use crate::prices::{CoinGeckoClient, PriceFetcher, PriceJobHandler, PRICES_JOB};
use crate::queue::{JobQueue, LocalJobQueue};
use crate::retry::RetryPolicy;
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let settings = Settings::from_env().map_err(PortfolioError::Config)?;
    // RUST_LOG overrides the configured console level when set.
    let console_level =
        std::env::var("RUST_LOG").unwrap_or_else(|_| settings.log_level.clone());
    let _guard = init_logging("./logs", "debug", &console_level)?;
    info!("Configuration loaded");
    info!("Connected to Solana RPC: {}", settings.solana_rpc_url);

    let address = std::env::args().nth(1).ok_or_else(|| {
        PortfolioError::InvalidConfig("usage: solfolio <wallet-public-key>".to_string())
    })?;

    let service = build_service(&settings).await;
    let portfolio = service.get_tokens(&address).await?;
    println!("{}", serde_json::to_string_pretty(&portfolio)?);

    Ok(())
}

/// Wires the production collaborators: Solana RPC ledger, token-list metadata
/// source, CoinGecko price oracle, a shared in-process cache store and a local
/// job queue mediating batch fetches.
async fn build_service(settings: &Settings) -> PortfolioService {
    let ttl = Duration::from_secs(settings.cache_ttl_secs);
    let store = Arc::new(InMemoryCache::new());
    let http = reqwest::Client::new();

    let retry = RetryPolicy::new(
        settings.retry_max_attempts,
        Duration::from_millis(settings.retry_base_delay_ms),
    );

    let metadata_source = Arc::new(TokenListSource::new(
        http.clone(),
        settings.token_list_url.clone(),
    ));
    let price_api = Arc::new(CoinGeckoClient::new(
        http,
        settings.coingecko_api_url.clone(),
        settings.coingecko_api_key.clone(),
    ));

    let job_queue = Arc::new(LocalJobQueue::new());
    job_queue
        .register(
            METADATA_JOB,
            Arc::new(MetadataJobHandler::new(metadata_source.clone())),
        )
        .await;
    job_queue
        .register(PRICES_JOB, Arc::new(PriceJobHandler::new(price_api.clone())))
        .await;
    let job_queue: Arc<dyn JobQueue> = job_queue;

    let balances = BalanceResolver::new(
        Arc::new(SolanaLedger::new(settings.solana_rpc_url.clone())),
        Cache::new(store.clone(), ttl),
    );

    let metadata = MetadataFetcher::new(
        metadata_source,
        Cache::new(store.clone(), ttl),
        Arc::new(RateLimiter::new(
            settings.metadata_bucket_capacity,
            Duration::from_millis(settings.metadata_refill_interval_ms),
        )),
        retry.clone(),
        settings.metadata_batch_size,
        FailurePolicy::BestEffort,
        ExecutionMode::Queued(job_queue.clone()),
    );

    let prices = PriceFetcher::new(
        price_api,
        Cache::new(store, ttl),
        Arc::new(RateLimiter::new(
            settings.price_bucket_capacity,
            Duration::from_millis(settings.price_refill_interval_ms),
        )),
        retry,
        settings.price_batch_size,
        ExecutionMode::Queued(job_queue),
    );

    PortfolioService::new(balances, metadata, prices)
}
