use thiserror::Error;

/// Main error type for the migration tool
#[derive(Error, Debug)]
pub enum MigrationError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    SchemaMigration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Source market errors
    #[error("Market not found: {0}")]
    MarketNotFound(String),

    #[error("Precondition failed for market {market_id}: {reason}")]
    Precondition { market_id: String, reason: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    // Pipeline errors
    #[error(
        "Cannot normalize probabilities for market {market_id}: sum is off by {excess}; probabilities {probabilities:?}"
    )]
    NormalizationIrresolvable {
        market_id: String,
        excess: f64,
        probabilities: Vec<f64>,
    },

    #[error("Write failed for market {market_id} at step {step}: {source}")]
    WriteFailed {
        market_id: String,
        step: CommitStep,
        #[source]
        source: Box<MigrationError>,
    },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for MigrationError
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Commit stage a write failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStep {
    ArchiveLegacy,
    Market,
    DeleteOutcome,
    CreateOutcome,
    Bets,
    DeleteBet,
    Liquidity,
    Metrics,
    FinishArchive,
}

impl CommitStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitStep::ArchiveLegacy => "archive_legacy",
            CommitStep::Market => "market",
            CommitStep::DeleteOutcome => "delete_outcome",
            CommitStep::CreateOutcome => "create_outcome",
            CommitStep::Bets => "bets",
            CommitStep::DeleteBet => "delete_bet",
            CommitStep::Liquidity => "liquidity",
            CommitStep::Metrics => "metrics",
            CommitStep::FinishArchive => "finish_archive",
        }
    }
}

impl std::fmt::Display for CommitStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MigrationError {
    /// Wrap a store error with the market and commit step it happened in
    pub fn write_failed(market_id: &str, step: CommitStep, source: MigrationError) -> Self {
        MigrationError::WriteFailed {
            market_id: market_id.to_string(),
            step,
            source: Box::new(source),
        }
    }

    /// Whether this error only affects the current market (the corpus run continues)
    pub fn is_market_scoped(&self) -> bool {
        !matches!(
            self,
            MigrationError::Config(_) | MigrationError::SchemaMigration(_)
        )
    }
}
