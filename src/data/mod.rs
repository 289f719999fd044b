//! Data module - chart script loading and replay

mod loader;
mod processor;

pub use loader::{ChartScript, LoaderError, ScriptLoader, Step};
pub use processor::{ProcessorError, RunReport, ScriptRunner, StepFailure};
