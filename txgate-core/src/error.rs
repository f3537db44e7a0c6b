/// Structured error types for txgate-core.
///
/// Uses `thiserror` for composable errors; the binary entry point wraps
/// these in `anyhow` for reporting.
use thiserror::Error;

/// Configuration loading failures.
///
/// All of these are startup defects: the process should refuse to boot
/// rather than run with a half-parsed environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An environment variable was present but could not be parsed.
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}
