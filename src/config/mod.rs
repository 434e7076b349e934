use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;
use std::convert::TryFrom;

/// Runtime settings, loaded from the process environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Solana configuration
    pub solana_rpc_url: String,

    // Price oracle configuration
    pub coingecko_api_url: String,
    pub coingecko_api_key: String,

    // Token metadata source
    pub token_list_url: String,

    // Cache configuration
    pub cache_ttl_secs: u64,

    // Batching
    pub metadata_batch_size: usize,
    pub price_batch_size: usize,

    // Rate limiting (token bucket per upstream API)
    pub metadata_bucket_capacity: u32,
    pub metadata_refill_interval_ms: u64,
    pub price_bucket_capacity: u32,
    pub price_refill_interval_ms: u64,

    // Retries
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,

    // Logging
    pub log_level: String,
}

impl TryFrom<Config> for Settings {
    type Error = ConfigError;

    fn try_from(config: Config) -> Result<Self, Self::Error> {
        Ok(Settings {
            solana_rpc_url: config.get_string("solana_rpc_url")?,
            coingecko_api_url: config.get_string("coingecko_api_url")?,
            coingecko_api_key: config.get_string("coingecko_api_key")?,
            token_list_url: config.get_string("token_list_url")?,
            cache_ttl_secs: config.get_int("cache_ttl_secs")? as u64,
            metadata_batch_size: config.get_int("metadata_batch_size")? as usize,
            price_batch_size: config.get_int("price_batch_size")? as usize,
            metadata_bucket_capacity: config.get_int("metadata_bucket_capacity")? as u32,
            metadata_refill_interval_ms: config.get_int("metadata_refill_interval_ms")? as u64,
            price_bucket_capacity: config.get_int("price_bucket_capacity")? as u32,
            price_refill_interval_ms: config.get_int("price_refill_interval_ms")? as u64,
            retry_max_attempts: config.get_int("retry_max_attempts")? as u32,
            retry_base_delay_ms: config.get_int("retry_base_delay_ms")? as u64,
            log_level: config.get_string("log_level")?,
        })
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = ConfigBuilder::<DefaultState>::default()
            .set_default("coingecko_api_url", "https://pro-api.coingecko.com/api/v3")?
            .set_default("token_list_url", "https://token.jup.ag/strict")?
            .set_default("cache_ttl_secs", 3600)?
            .set_default("metadata_batch_size", 50)?
            .set_default("price_batch_size", 50)?
            .set_default("metadata_bucket_capacity", 10)?
            .set_default("metadata_refill_interval_ms", 1000)?
            .set_default("price_bucket_capacity", 10)?
            .set_default("price_refill_interval_ms", 1000)?
            .set_default("retry_max_attempts", 3)?
            .set_default("retry_base_delay_ms", 300)?
            .set_default("log_level", "info")?
            .add_source(Environment::default())
            .build()?;

        Settings::try_from(config)
    }
}
