use futures::try_join;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::balances::{BalanceResolver, ParsedTokenAccount};
use crate::error::{PortfolioError, Result};
use crate::metadata::MetadataFetcher;
use crate::prices::PriceFetcher;

const NATIVE_SYMBOL: &str = "sol";

/// One valued holding in the portfolio response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedHolding {
    #[serde(rename = "mintAddress")]
    pub mint_address: String,
    pub name: String,
    pub symbol: String,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    pub decimals: u8,
    /// Fixed-point display balance with exactly `decimals` fractional digits.
    pub balance: String,
    /// USD price; 0 when the symbol could not be priced.
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub holdings: Vec<PricedHolding>,
    #[serde(rename = "totalValue")]
    pub total_value: String,
}

impl Portfolio {
    fn empty() -> Self {
        Self {
            holdings: Vec::new(),
            total_value: "0.00".to_string(),
        }
    }
}

/// Orchestrates balances, metadata and prices into a consolidated valuation.
pub struct PortfolioService {
    balances: BalanceResolver,
    metadata: MetadataFetcher,
    prices: PriceFetcher,
}

impl PortfolioService {
    pub fn new(
        balances: BalanceResolver,
        metadata: MetadataFetcher,
        prices: PriceFetcher,
    ) -> Self {
        Self {
            balances,
            metadata,
            prices,
        }
    }

    pub async fn get_tokens(&self, address: &str) -> Result<Portfolio> {
        info!("Building portfolio for {}", address);

        let (sol_balance, token_accounts) = try_join!(
            self.balances.get_sol_balance(address),
            self.balances.get_token_accounts_by_owner(address)
        )
        .map_err(|e| {
            error!("Balance resolution failed for {}: {}", address, e);
            e
        })?;

        if token_accounts.is_empty() {
            info!("No token accounts for {}, returning empty portfolio", address);
            return Ok(Portfolio::empty());
        }

        let mints = distinct_mints(&token_accounts);
        let metadata = self.metadata.get_token_metadata(&mints).await.map_err(|e| {
            error!("Metadata resolution failed for {}: {}", address, e);
            e
        })?;

        let symbols: Vec<String> = metadata
            .iter()
            .map(|token| token.symbol.to_lowercase())
            .filter(|symbol| !symbol.is_empty())
            .collect();
        if symbols.is_empty() {
            info!(
                "No priceable symbols for {}, returning empty portfolio",
                address
            );
            return Ok(Portfolio::empty());
        }

        let native_symbol = vec![NATIVE_SYMBOL.to_string()];
        let (prices, native_prices) = try_join!(
            self.prices.get_token_prices(&symbols),
            self.prices.get_token_prices(&native_symbol)
        )
        .map_err(|e| {
            error!("Price resolution failed for {}: {}", address, e);
            e
        })?;

        let mut holdings = Vec::new();
        let mut total_value = 0.0;
        for token in metadata {
            let Some(account) = token_accounts
                .iter()
                .find(|account| account.mint_address == token.mint)
            else {
                continue;
            };

            let balance = format_units(&account.amount, account.decimals)?;
            let symbol_key = token.symbol.to_lowercase();
            let price = match prices.get(&symbol_key) {
                Some(point) => point.usd,
                None => {
                    // 0 is ambiguous between "worthless" and "unmapped".
                    warn!("Price unresolved for symbol '{}', using 0", token.symbol);
                    0.0
                }
            };

            total_value += balance.parse::<f64>().unwrap_or(0.0) * price;
            holdings.push(PricedHolding {
                mint_address: token.mint,
                name: token.name,
                symbol: token.symbol,
                image_url: token.image,
                decimals: account.decimals,
                balance,
                price,
            });
        }

        let native_price = match native_prices.get(NATIVE_SYMBOL) {
            Some(point) => point.usd,
            None => {
                warn!("Price unresolved for native symbol, using 0");
                0.0
            }
        };
        total_value += sol_balance * native_price;

        Ok(Portfolio {
            holdings,
            total_value: format!("{:.2}", total_value),
        })
    }
}

fn distinct_mints(accounts: &[ParsedTokenAccount]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    accounts
        .iter()
        .filter(|account| seen.insert(account.mint_address.clone()))
        .map(|account| account.mint_address.clone())
        .collect()
}

/// Formats a raw base-unit amount as a fixed-point decimal string with
/// exactly `decimals` fractional digits, using integer math throughout.
fn format_units(raw_amount: &str, decimals: u8) -> Result<String> {
    let raw: u128 = raw_amount.parse().map_err(|e| {
        PortfolioError::Internal(format!("malformed raw amount '{}': {}", raw_amount, e))
    })?;

    if decimals == 0 {
        return Ok(raw.to_string());
    }

    // u128 holds at most 10^38; anything beyond that cannot be a real mint.
    let scale = 10u128.checked_pow(decimals as u32).ok_or_else(|| {
        PortfolioError::Internal(format!("unsupported decimals value {}", decimals))
    })?;
    let integer = raw / scale;
    let fraction = raw % scale;
    Ok(format!(
        "{}.{:0width$}",
        integer,
        fraction,
        width = decimals as usize
    ))
}
