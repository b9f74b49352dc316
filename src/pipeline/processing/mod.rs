// Pipeline processing: cleaning, deduplication, enrichment and joining

pub mod dedupe;
pub mod enrich;
pub mod join;
pub mod normalize;

// Re-export key types and functions
pub use dedupe::{dedupe, dedupe_sequence, DedupePass, Keep};
pub use enrich::{EnricherSettings, EnrichmentOutcome, EnrichmentStats, GeoEnricher};
pub use join::{join, JoinKind};
pub use normalize::{normalize, NormalizationRules};
