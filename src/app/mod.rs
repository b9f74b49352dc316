pub mod business_use_case;
pub mod orchestrator;
pub mod ports;
pub mod postcode_use_case;
pub mod settings;
pub mod venue_use_case;

pub use orchestrator::{
    PipelineOrchestrator, PipelineOutcome, PipelineSelection, PipelineStatus, RunReport,
};
pub use settings::{PipelineSettings, SampleSize};
