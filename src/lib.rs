//! Point-in-time statistics for a personal daily tracking log: causal per-category
//! z-scores and ranks, a composite index, the divergence between how a day felt and
//! what the numbers say, and a search for historical days with a similar profile.

pub mod config;
pub mod db;
pub mod divergence;
pub mod ingest;
pub mod models;
pub mod report;
pub mod similarity;
pub mod stats;

pub use divergence::{classify_divergence, Thresholds};
pub use models::{CacheEntry, DayRecord, Dataset, DivergenceResult, SimilarityMatch, StatsCache};
pub use similarity::{find_similar_days, SimilarityQuery};
pub use stats::{build_cache, SharedCache};
