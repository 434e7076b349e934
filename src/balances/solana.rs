use async_trait::async_trait;
use serde_json::Value;
use solana_account_decoder::UiAccountData;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::debug;

use crate::error::{PortfolioError, Result};

use super::{LedgerRpc, ParsedTokenAccount};

const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Ledger collaborator over the Solana JSON-RPC API.
pub struct SolanaLedger {
    client: RpcClient,
}

impl SolanaLedger {
    pub fn new(rpc_url: String) -> Self {
        Self {
            client: RpcClient::new(rpc_url),
        }
    }

    fn parse_pubkey(address: &str) -> Result<Pubkey> {
        Pubkey::from_str(address)
            .map_err(|e| PortfolioError::parse(format!("invalid public key: {}", e), address))
    }
}

#[async_trait]
impl LedgerRpc for SolanaLedger {
    async fn get_balance(&self, address: &str) -> Result<u64> {
        let pubkey = Self::parse_pubkey(address)?;
        self.client
            .get_balance(&pubkey)
            .await
            .map_err(|e| PortfolioError::rpc(e.to_string(), address))
    }

    async fn get_parsed_token_accounts(&self, address: &str) -> Result<Vec<ParsedTokenAccount>> {
        let pubkey = Self::parse_pubkey(address)?;
        let program = Pubkey::from_str(TOKEN_PROGRAM_ID)
            .map_err(|e| PortfolioError::Internal(format!("bad token program id: {}", e)))?;

        let keyed_accounts = self
            .client
            .get_token_accounts_by_owner(&pubkey, TokenAccountsFilter::ProgramId(program))
            .await
            .map_err(|e| PortfolioError::rpc(e.to_string(), address))?;
        debug!(
            "Ledger returned {} token accounts for {}",
            keyed_accounts.len(),
            address
        );

        keyed_accounts
            .into_iter()
            .map(|keyed| match keyed.account.data {
                UiAccountData::Json(parsed) => parse_token_account(&parsed.parsed, address),
                _ => Err(PortfolioError::parse(
                    format!("account {} not in jsonParsed encoding", keyed.pubkey),
                    address,
                )),
            })
            .collect()
    }
}

/// Extracts {mint, amount, decimals} from one jsonParsed token account.
fn parse_token_account(parsed: &Value, address: &str) -> Result<ParsedTokenAccount> {
    let info = &parsed["info"];
    let mint_address = info["mint"]
        .as_str()
        .ok_or_else(|| PortfolioError::parse("token account missing mint", address))?
        .to_string();
    let amount = info["tokenAmount"]["amount"]
        .as_str()
        .ok_or_else(|| PortfolioError::parse("token account missing amount", address))?
        .to_string();
    let decimals = info["tokenAmount"]["decimals"]
        .as_u64()
        .filter(|d| *d <= u8::MAX as u64)
        .ok_or_else(|| {
            PortfolioError::parse("token account missing or invalid decimals", address)
        })? as u8;

    Ok(ParsedTokenAccount {
        mint_address,
        amount,
        decimals,
    })
}
