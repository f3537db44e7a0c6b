pub mod config;
pub mod ctx;
pub mod error;
pub mod trace;

pub use config::{AppConfig, PgConfig};
pub use ctx::{CancelHandle, RequestCx};
pub use error::ConfigError;
pub use trace::init_tracing;
