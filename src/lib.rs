// Public modules that are part of the API
pub mod balances;
pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod metadata;
pub mod monitoring;
pub mod portfolio;
pub mod prices;
pub mod queue;
pub mod retry;

// Re-export common types
pub use balances::{BalanceResolver, LedgerRpc, ParsedTokenAccount, SolanaLedger};
pub use batch::FailurePolicy;
pub use cache::{Cache, CacheStore, InMemoryCache};
pub use error::{PortfolioError, Result};
pub use limiter::RateLimiter;
pub use metadata::{
    ExecutionMode, MetadataFetcher, MetadataJobHandler, MetadataSource, TokenListSource,
    TokenMetadata,
};
pub use portfolio::{Portfolio, PortfolioService, PricedHolding};
pub use prices::{CoinGeckoClient, PriceApi, PriceFetcher, PriceJobHandler, PricePoint};
pub use queue::{JobHandler, JobQueue, LocalJobQueue};
pub use retry::RetryPolicy;
