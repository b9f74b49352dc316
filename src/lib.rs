pub mod config;
pub mod constants;
pub mod error;
pub mod idempotency;
pub mod observability;
pub mod pipeline;
pub mod retry;
pub mod table;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

// Domain data shapes shared across layers
pub mod domain;

pub use error::{EnrichmentFailure, EtlError, Result};
