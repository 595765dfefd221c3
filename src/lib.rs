pub mod config;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod format;
pub mod logging;
pub mod merge;
pub mod metadata;
pub mod models;
pub mod paths;
pub mod pipeline;
pub mod process;
pub mod tags;
pub mod trim;

pub use error::{PipelineError, Result};
