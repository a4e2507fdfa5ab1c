pub mod clock;
pub mod controller;
pub mod grouping;
mod loop_worker;
pub mod pipeline;
pub mod prompts;
pub mod response;
pub mod retention;

pub use controller::AnalysisController;
pub use pipeline::{BatchError, BatchPipeline, ClearReport, PassReport, ReprocessOutcome};
