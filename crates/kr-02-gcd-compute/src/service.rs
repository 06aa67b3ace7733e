//! # GCD Compute Service
//!
//! Validates a request, computes the GCD on the blocking pool and reports
//! the outcome to the request's callback URL.
//!
//! | Outcome | Status |
//! |---------|--------|
//! | Result computed and delivered | 200 |
//! | Missing or invalid input | 400 |
//! | Computation failed, or result not delivered | 500 |

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, warn};

use crate::domain::compute::GcdComputation;
use crate::domain::errors::ComputeError;
use crate::domain::request::{CallbackPayload, GcdRequest, GcdTask};
use crate::ports::outbound::CallbackSender;

/// Bounded exponential backoff for callback delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt `attempt` (0-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

pub struct GcdComputeService<C> {
    computation: Arc<GcdComputation>,
    sender: Arc<C>,
    retry: RetryPolicy,
}

impl<C: CallbackSender> GcdComputeService<C> {
    pub fn new(computation: GcdComputation, sender: Arc<C>, retry: RetryPolicy) -> Self {
        Self {
            computation: Arc::new(computation),
            sender,
            retry,
        }
    }

    /// Deliver `payload`, retrying with backoff. No delay follows the last
    /// attempt.
    pub async fn deliver(&self, url: &str, payload: &CallbackPayload) -> bool {
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 0..attempts {
            match self.sender.send(url, payload).await {
                Ok(()) => {
                    info!(url, attempt = attempt + 1, "Callback sent");
                    return true;
                }
                Err(e) => warn!(url, attempt = attempt + 1, error = %e, "Callback attempt failed"),
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(self.retry.backoff(attempt)).await;
            }
        }
        error!(url, attempts, "Failed to send callback");
        false
    }

    /// Process one raw request body.
    pub async fn handle(&self, body: &[u8]) -> (StatusCode, String) {
        let request = match GcdRequest::from_body(body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejected request");
                return (StatusCode::BAD_REQUEST, e.to_string());
            }
        };

        let task = match request.validate() {
            Ok(task) => task,
            Err(e) => {
                warn!(task_id = %request.task_id, error = %e, "Rejected request");
                if let Some(url) = request.callback_url() {
                    self.deliver(url, &request.rejection(&e)).await;
                }
                return (StatusCode::BAD_REQUEST, e.to_string());
            }
        };

        match self.compute(&task).await {
            Ok(payload) => {
                if self.deliver(&task.callback_url, &payload).await {
                    (
                        StatusCode::OK,
                        "Calculation completed and result sent to callback URL.".into(),
                    )
                } else {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Calculation completed but failed to send callback.".into(),
                    )
                }
            }
            Err(e) => {
                let message = format!("Calculation failed: {e}");
                error!(task_id = %task.task_id, error = %e, "Calculation failed");
                let payload = CallbackPayload::failure(
                    task.task_id.clone(),
                    task.metadata.clone(),
                    message.clone(),
                );
                self.deliver(&task.callback_url, &payload).await;
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }

    async fn compute(&self, task: &GcdTask) -> Result<CallbackPayload, ComputeError> {
        info!(
            task_id = %task.task_id,
            exponent = self.computation.exponent,
            "Starting calculation"
        );
        let started = Instant::now();

        let computation = Arc::clone(&self.computation);
        let operands = task.operands.clone();
        let n = tokio::task::spawn_blocking(move || computation.compute(&operands))
            .await
            .map_err(|e| ComputeError::Aborted(e.to_string()))??;

        info!(
            task_id = %task.task_id,
            bits = n.bits(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Calculation completed"
        );
        Ok(CallbackPayload::success(task, n.to_string()))
    }
}

// =============================================================================
// HTTP Surface
// =============================================================================

/// `POST /` runs a computation, `GET /health` reports liveness.
pub fn router<C: CallbackSender + 'static>(service: Arc<GcdComputeService<C>>) -> Router {
    Router::new()
        .route("/", post(handle_compute::<C>))
        .route("/health", get(health_check))
        .with_state(service)
}

async fn handle_compute<C: CallbackSender + 'static>(
    State(service): State<Arc<GcdComputeService<C>>>,
    body: Bytes,
) -> impl IntoResponse {
    service.handle(&body).await
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "gcd-compute",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
