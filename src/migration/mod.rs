//! Migration of legacy pari-mutuel multi-answer markets to constant-product
//! multi-answer markets.
//!
//! Pure stages (`liquidity`, `pool`, `normalize`, `bets`, `resolution`,
//! `metrics`, `plan`) sit between the store-facing `reader` and `commit`.

pub mod bets;
pub mod commit;
pub mod dump;
pub mod liquidity;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod plan;
pub mod pool;
pub mod reader;
pub mod resolution;

pub use commit::Committer;
pub use dump::{collect_legacy_markets, dump_legacy_markets, DEFAULT_DUMP_FILE};
pub use pipeline::{CorpusEntry, CorpusReport, MarketFailure, MarketReport, MigrationPipeline};
pub use plan::{build_plan, MigrationPlan};
pub use reader::{LegacyReader, ReadResult, RejectedRecord};
