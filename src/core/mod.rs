pub mod config;
pub mod error;
pub mod logging;
pub mod plate;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use logging::PipelineLogger;
