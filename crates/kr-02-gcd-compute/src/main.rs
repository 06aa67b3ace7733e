//! # GCD Compute Server
//!
//! Serves `POST /` and `GET /health` on `KR_COMPUTE_BIND`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use kr_02_gcd_compute::{router, ComputeConfig, GcdComputeService, HttpCallbackSender};
use recovery_telemetry::TelemetryConfig;

#[tokio::main]
async fn main() -> Result<()> {
    recovery_telemetry::init_logging(&TelemetryConfig::from_env())
        .context("failed to initialise logging")?;

    let config = ComputeConfig::from_env();
    let sender = HttpCallbackSender::new(config.callback_timeout)
        .context("failed to build callback client")?;
    let service = GcdComputeService::new(
        config.computation(),
        Arc::new(sender),
        config.retry_policy(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(
        addr = %config.bind_addr,
        exponent = config.exponent,
        callback_attempts = config.callback_attempts,
        "GCD compute server listening"
    );

    axum::serve(listener, router(Arc::new(service)))
        .await
        .context("server error")?;
    Ok(())
}
