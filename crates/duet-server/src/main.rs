//! duet server binary.
//!
//! ```bash
//! # Run with defaults (127.0.0.1:8080, 1 h TTL, 60 s sweeps)
//! duet-server
//!
//! # Override via environment
//! DUET_ADDR=0.0.0.0:9000 DUET_WAITING_TTL_SECS=1800 duet-server
//! ```

use duet_server::{DuetServer, ServerConfig, ServerError};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                |_| "duet_server=info,duet_room=info,duet_broadcast=info".into(),
            ),
        )
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        addr = %config.addr,
        ttl_s = config.waiting_ttl.as_secs(),
        sweep_s = config.sweep_interval.as_secs(),
        "starting duet server"
    );

    let server = DuetServer::builder()
        .bind(&config.addr)
        .waiting_ttl(config.waiting_ttl)
        .sweep_interval(config.sweep_interval)
        .build()
        .await?;

    server.run().await
}
