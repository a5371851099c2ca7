pub mod config;
pub mod error;
pub mod paths;

pub use config::{Config, EvaluateConfig, OutputConfig};
pub use error::{Error, Result};
pub use paths::Paths;
