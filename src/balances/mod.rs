use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::cache::Cache;
use crate::error::Result;

mod solana;
pub use solana::SolanaLedger;

pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// One on-chain token account of the queried owner. Multiple accounts for the
/// same mint stay separate; merging is the caller's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTokenAccount {
    #[serde(rename = "mintAddress")]
    pub mint_address: String,
    /// Raw amount in base units, as the ledger reports it.
    pub amount: String,
    pub decimals: u8,
}

/// Boundary to the ledger RPC. Implementations wrap failures as
/// `Rpc`/`Parse` errors carrying the queried address.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Native balance in lamports.
    async fn get_balance(&self, address: &str) -> Result<u64>;
    async fn get_parsed_token_accounts(&self, address: &str) -> Result<Vec<ParsedTokenAccount>>;
}

/// Cache-backed resolution of native balance and token holdings. No retries
/// here; transient-failure handling belongs to the caller.
pub struct BalanceResolver {
    rpc: Arc<dyn LedgerRpc>,
    cache: Cache,
}

impl BalanceResolver {
    pub fn new(rpc: Arc<dyn LedgerRpc>, cache: Cache) -> Self {
        Self { rpc, cache }
    }

    /// Native balance in SOL display units.
    pub async fn get_sol_balance(&self, address: &str) -> Result<f64> {
        let cache_key = format!("solBalance-{}", address);
        if let Some(balance) = self.cache.get_json::<f64>(&cache_key).await {
            info!("Cache hit for SOL balance of {}", address);
            return Ok(balance);
        }

        let lamports = self.rpc.get_balance(address).await?;
        let sol_balance = lamports as f64 / LAMPORTS_PER_SOL;

        self.cache.set_json(&cache_key, &sol_balance).await?;
        info!("Fetched SOL balance for {}: {} SOL", address, sol_balance);
        Ok(sol_balance)
    }

    pub async fn get_token_accounts_by_owner(
        &self,
        address: &str,
    ) -> Result<Vec<ParsedTokenAccount>> {
        let cache_key = format!("tokenAccounts-{}", address);
        if let Some(accounts) = self
            .cache
            .get_json::<Vec<ParsedTokenAccount>>(&cache_key)
            .await
        {
            info!("Cache hit for token accounts of {}", address);
            return Ok(accounts);
        }

        let accounts = self.rpc.get_parsed_token_accounts(address).await?;

        self.cache.set_json(&cache_key, &accounts).await?;
        info!("Fetched {} token accounts for {}", accounts.len(), address);
        Ok(accounts)
    }
}
