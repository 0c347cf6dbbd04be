pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::JobContext;
pub use error::{PipelineError, PipelineWarning};
pub use progress::{DbProgressReporter, NoopProgress, ProgressReporter};
pub use runner::RestoreJobRunner;
