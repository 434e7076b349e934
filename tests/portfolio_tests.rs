// End-to-end portfolio aggregation over faked collaborators.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use solfolio::metadata::{
    LoadedMetadata, MetadataJobHandler, MetadataRecord, OffchainMetadata, RecordInfo, METADATA_JOB,
};
use solfolio::prices::{CoinListEntry, PriceJobHandler, PRICES_JOB};
use solfolio::{
    BalanceResolver, Cache, ExecutionMode, FailurePolicy, JobQueue, LedgerRpc, LocalJobQueue,
    MetadataFetcher, MetadataSource, ParsedTokenAccount, PortfolioService, PriceApi, PriceFetcher,
    PricePoint, RateLimiter, Result, RetryPolicy,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FakeLedger {
    lamports: u64,
    accounts: Vec<ParsedTokenAccount>,
}

#[async_trait]
impl LedgerRpc for FakeLedger {
    async fn get_balance(&self, _address: &str) -> Result<u64> {
        Ok(self.lamports)
    }

    async fn get_parsed_token_accounts(&self, _address: &str) -> Result<Vec<ParsedTokenAccount>> {
        Ok(self.accounts.clone())
    }
}

struct FakeMetadata {
    tokens: Vec<(String, String, String, Option<String>)>, // (mint, name, symbol, image)
    calls: AtomicU32,
}

impl FakeMetadata {
    fn new(tokens: &[(&str, &str, &str, Option<&str>)]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|(m, n, s, i)| {
                    (
                        m.to_string(),
                        n.to_string(),
                        s.to_string(),
                        i.map(|v| v.to_string()),
                    )
                })
                .collect(),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn find_by_mint_list(&self, mints: &[String]) -> Result<Vec<MetadataRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tokens
            .iter()
            .filter(|(mint, ..)| mints.contains(mint))
            .map(|(mint, name, symbol, _)| {
                MetadataRecord::Metadata(RecordInfo {
                    mint: mint.clone(),
                    name: name.clone(),
                    symbol: symbol.clone(),
                })
            })
            .collect())
    }

    async fn load(&self, record: &RecordInfo) -> Result<LoadedMetadata> {
        let image = self
            .tokens
            .iter()
            .find(|(mint, ..)| *mint == record.mint)
            .and_then(|(.., image)| image.clone());
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

struct FakePriceApi {
    prices: HashMap<String, f64>,
    price_calls: AtomicU32,
}

impl FakePriceApi {
    fn new(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: prices.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            price_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PriceApi for FakePriceApi {
    async fn list_coins(&self) -> Result<Vec<CoinListEntry>> {
        // Canonical ids equal to the lowercase symbols, as the fixtures expect.
        Ok(self
            .prices
            .keys()
            .map(|id| CoinListEntry {
                id: id.clone(),
                symbol: id.clone(),
            })
            .collect())
    }

    async fn simple_price(&self, ids: &[String]) -> Result<HashMap<String, PricePoint>> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.prices
                    .get(id)
                    .map(|usd| (id.clone(), PricePoint { usd: *usd }))
            })
            .collect())
    }
}

fn build_service(
    ledger: Arc<FakeLedger>,
    metadata_source: Arc<FakeMetadata>,
    price_api: Arc<FakePriceApi>,
    mode: ExecutionMode,
) -> PortfolioService {
    let ttl = Duration::from_secs(60);
    let retry = RetryPolicy::new(2, Duration::from_millis(5));

    let balances = BalanceResolver::new(ledger, Cache::in_memory(ttl));
    let metadata = MetadataFetcher::new(
        metadata_source,
        Cache::in_memory(ttl),
        Arc::new(RateLimiter::new(100, Duration::from_secs(1))),
        retry.clone(),
        50,
        FailurePolicy::BestEffort,
        mode.clone(),
    );
    let prices = PriceFetcher::new(
        price_api,
        Cache::in_memory(ttl),
        Arc::new(RateLimiter::new(100, Duration::from_secs(1))),
        retry,
        50,
        mode,
    );

    PortfolioService::new(balances, metadata, prices)
}

fn single_account_fixture() -> (Arc<FakeLedger>, Arc<FakeMetadata>, Arc<FakePriceApi>) {
    let ledger = Arc::new(FakeLedger {
        lamports: 1_000_000_000, // exactly 1 SOL
        accounts: vec![ParsedTokenAccount {
            mint_address: "M1".to_string(),
            amount: "1000".to_string(),
            decimals: 9,
        }],
    });
    let metadata = Arc::new(FakeMetadata::new(&[("M1", "Token1", "T1", Some("img1"))]));
    let prices = Arc::new(FakePriceApi::new(&[("t1", 2.0), ("sol", 100.0)]));
    (ledger, metadata, prices)
}

#[tokio::test]
async fn test_single_holding_is_priced_and_totalled() {
    let (ledger, metadata, prices) = single_account_fixture();
    let service = build_service(ledger, metadata, prices, ExecutionMode::Direct);

    let portfolio = service.get_tokens("A").await.unwrap();

    assert_eq!(portfolio.holdings.len(), 1);
    let holding = &portfolio.holdings[0];
    assert_eq!(holding.mint_address, "M1");
    assert_eq!(holding.name, "Token1");
    assert_eq!(holding.symbol, "T1");
    assert_eq!(holding.image_url, Some("img1".to_string()));
    assert_eq!(holding.balance, "0.000001000");
    assert_eq!(holding.price, 2.0);

    // 0.000001000 * 2 + 1 * 100, to two decimal places.
    assert_eq!(portfolio.total_value, "100.00");
}

#[tokio::test]
async fn test_zero_token_accounts_short_circuits() {
    let ledger = Arc::new(FakeLedger {
        lamports: 5_000_000_000,
        accounts: vec![],
    });
    let metadata = Arc::new(FakeMetadata::new(&[]));
    let prices = Arc::new(FakePriceApi::new(&[("sol", 100.0)]));
    let service = build_service(
        ledger,
        metadata.clone(),
        prices.clone(),
        ExecutionMode::Direct,
    );

    let portfolio = service.get_tokens("A").await.unwrap();

    assert!(portfolio.holdings.is_empty());
    assert_eq!(portfolio.total_value, "0.00");
    // Neither fetcher was invoked.
    assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);
    assert_eq!(prices.price_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_all_empty_symbols_skip_price_lookup() {
    let ledger = Arc::new(FakeLedger {
        lamports: 1_000_000_000,
        accounts: vec![ParsedTokenAccount {
            mint_address: "M1".to_string(),
            amount: "1000".to_string(),
            decimals: 9,
        }],
    });
    let metadata = Arc::new(FakeMetadata::new(&[("M1", "Token1", "", None)]));
    let prices = Arc::new(FakePriceApi::new(&[("sol", 100.0)]));
    let service = build_service(ledger, metadata, prices.clone(), ExecutionMode::Direct);

    let portfolio = service.get_tokens("A").await.unwrap();

    assert!(portfolio.holdings.is_empty());
    assert_eq!(portfolio.total_value, "0.00");
    assert_eq!(prices.price_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unpriced_symbol_defaults_to_zero() {
    let ledger = Arc::new(FakeLedger {
        lamports: 0,
        accounts: vec![ParsedTokenAccount {
            mint_address: "M1".to_string(),
            amount: "5000000000".to_string(),
            decimals: 9,
        }],
    });
    let metadata = Arc::new(FakeMetadata::new(&[("M1", "Obscure", "OBS", None)]));
    // "obs" maps to a canonical id but the price response omits it.
    let prices = Arc::new(FakePriceApi::new(&[("obs", 0.0), ("sol", 100.0)]));
    let service = build_service(ledger, metadata, prices, ExecutionMode::Direct);

    let portfolio = service.get_tokens("A").await.unwrap();
    assert_eq!(portfolio.holdings[0].price, 0.0);
    assert_eq!(portfolio.total_value, "0.00");
}

#[tokio::test]
async fn test_queued_execution_matches_direct() {
    let (ledger, metadata, prices) = single_account_fixture();

    let queue = Arc::new(LocalJobQueue::new());
    queue
        .register(METADATA_JOB, Arc::new(MetadataJobHandler::new(metadata.clone())))
        .await;
    queue
        .register(PRICES_JOB, Arc::new(PriceJobHandler::new(prices.clone())))
        .await;
    let queue: Arc<dyn JobQueue> = queue;

    let service = build_service(ledger, metadata, prices, ExecutionMode::Queued(queue));

    let portfolio = service.get_tokens("A").await.unwrap();
    assert_eq!(portfolio.holdings.len(), 1);
    assert_eq!(portfolio.holdings[0].balance, "0.000001000");
    assert_eq!(portfolio.total_value, "100.00");
}
