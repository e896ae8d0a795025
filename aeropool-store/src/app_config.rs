use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub stripe: StripeConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
    /// Kept short: requests should fail fast instead of queueing behind a
    /// held capacity or wallet row lock.
    #[serde(default = "default_db_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

/// Redis is optional: no URL means the cache layer degrades to a no-op.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub refresh_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_seconds: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    #[serde(default = "default_onboarding_return_url")]
    pub onboarding_return_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_fee_percent")]
    pub platform_fee_percent: i64,
    #[serde(default = "default_search_radius_m")]
    pub search_radius_m: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_search_cache_secs")]
    pub search_cache_secs: u64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            platform_fee_percent: default_fee_percent(),
            search_radius_m: default_search_radius_m(),
            currency: default_currency(),
            search_cache_secs: default_search_cache_secs(),
        }
    }
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout() -> u64 {
    3
}

fn default_access_ttl() -> u64 {
    900 // 15m
}

fn default_refresh_ttl() -> u64 {
    604_800 // 7d
}

fn default_fee_percent() -> i64 {
    10
}

fn default_search_radius_m() -> f64 {
    8_000.0
}

fn default_currency() -> String {
    "eur".to_string()
}

fn default_search_cache_secs() -> u64 {
    60
}

fn default_onboarding_return_url() -> String {
    "https://app.aeropool.example/wallet/bank-status".to_string()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // AEROPOOL__DATABASE__URL=... style overrides
            .add_source(config::Environment::with_prefix("AEROPOOL").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
