use std::path::PathBuf;
use thiserror::Error;

/// Fatal startup errors.  Per-tick anomalies (out-of-range banks, refused
/// sends, truncated kernel expansion) are recovered locally and never
/// surface here.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("trace {path} cannot be opened: {source}")]
    TraceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("trace {path} format invalid at line {line}: {reason}")]
    TraceFormat {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("unknown KV cache policy `{0}`")]
    UnknownPolicy(String),
}
