use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An RPC failed, timed out, or answered without the expected result field.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Failed to parse date '{input}': {source}")]
    DateParse {
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    /// The remote context threw while evaluating.
    #[error("JavaScript error: {0}")]
    JavaScript(String),
}

pub type Result<T> = std::result::Result<T, Error>;
