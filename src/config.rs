use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub migration: MigrationConfig,
    #[serde(default)]
    pub revalidation: RevalidationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// What happens to the legacy snapshot once a market has been migrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LegacyRetention {
    /// Keep the archived legacy market, answers and bets as historical records
    #[default]
    Retain,
    /// Delete the archive after a successful commit
    Discard,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    /// Subsidy contributed by each distinct bettor on an outcome
    #[serde(default = "default_base_liquidity_per_bettor")]
    pub base_liquidity_per_bettor: f64,
    /// Flat subsidy split evenly across all outcomes
    #[serde(default = "default_flat_liquidity_share")]
    pub flat_liquidity_share: f64,
    /// Probability floor applied to every outcome
    #[serde(default = "default_min_prob")]
    pub min_prob: f64,
    /// Allowed drift of the probability sum above 1 before normalization kicks in
    #[serde(default = "default_sum_tolerance")]
    pub sum_tolerance: f64,
    /// Account liquidity records are attributed to
    pub house_liquidity_provider_id: String,
    /// Concurrent bet writes within a single market
    #[serde(default = "default_write_concurrency")]
    pub write_concurrency: usize,
    /// Warn when a single market takes longer than this
    #[serde(default = "default_slow_market_warn_secs")]
    pub slow_market_warn_secs: u64,
    #[serde(default)]
    pub legacy_retention: LegacyRetention,
    /// Public site root used to print market URLs
    #[serde(default = "default_site_url")]
    pub site_url: String,
}

fn default_base_liquidity_per_bettor() -> f64 {
    20.0
}

fn default_flat_liquidity_share() -> f64 {
    200.0
}

fn default_min_prob() -> f64 {
    0.0001
}

fn default_sum_tolerance() -> f64 {
    1e-7
}

fn default_write_concurrency() -> usize {
    16
}

fn default_slow_market_warn_secs() -> u64 {
    300
}

fn default_site_url() -> String {
    "https://manifold.markets".to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            base_liquidity_per_bettor: default_base_liquidity_per_bettor(),
            flat_liquidity_share: default_flat_liquidity_share(),
            min_prob: default_min_prob(),
            sum_tolerance: default_sum_tolerance(),
            house_liquidity_provider_id: "house-liquidity-provider".to_string(),
            write_concurrency: default_write_concurrency(),
            slow_market_warn_secs: default_slow_market_warn_secs(),
            legacy_retention: LegacyRetention::default(),
            site_url: default_site_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RevalidationConfig {
    /// Trigger static page revalidation after each migrated market
    #[serde(default)]
    pub enabled: bool,
    /// Web host serving `/api/v0/revalidate`
    #[serde(default)]
    pub base_url: Option<String>,
    /// Secret passed to the revalidation endpoint
    #[serde(default)]
    pub api_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DPM_MIGRATE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // DPM_MIGRATE__DATABASE__URL, DPM_MIGRATE__MIGRATION__MIN_PROB, ...
            .add_source(
                Environment::with_prefix("DPM_MIGRATE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let m = &self.migration;

        if m.base_liquidity_per_bettor < 0.0 {
            errors.push("base_liquidity_per_bettor must not be negative".to_string());
        }

        if m.flat_liquidity_share <= 0.0 {
            errors.push("flat_liquidity_share must be positive".to_string());
        }

        if m.min_prob <= 0.0 || m.min_prob >= 0.5 {
            errors.push("min_prob must be between 0 and 0.5".to_string());
        }

        if m.sum_tolerance <= 0.0 {
            errors.push("sum_tolerance must be positive".to_string());
        }

        if m.write_concurrency == 0 {
            errors.push("write_concurrency must be at least 1".to_string());
        }

        if m.house_liquidity_provider_id.trim().is_empty() {
            errors.push("house_liquidity_provider_id must be set".to_string());
        }

        if self.revalidation.enabled {
            if self.revalidation.base_url.is_none() {
                errors.push("revalidation.base_url is required when revalidation is enabled".to_string());
            }
            if self.revalidation.api_secret.is_none() {
                errors.push("revalidation.api_secret is required when revalidation is enabled".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
