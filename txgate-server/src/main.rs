//! txgated: the txgate HTTP server binary.

use anyhow::Result;

use txgate_core::{init_tracing, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let debug = std::env::args().any(|arg| arg == "--debug");
    init_tracing(debug)?;

    let config = AppConfig::from_env()?;
    txgate_server::serve(config).await
}
