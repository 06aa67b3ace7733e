//! # Local Modulus Solver
//!
//! Runs `ModulusRecovery` on tokio's blocking pool. A single full-width
//! GCD can take seconds, so it must never run on an async worker.

use std::sync::Arc;

use shared_types::SignatureRecord;

use crate::domain::entities::{RecoveredKey, SearchConfig};
use crate::domain::errors::RecoveryError;
use crate::domain::recovery::ModulusRecovery;
use crate::ports::outbound::ModulusSolver;

#[derive(Debug, Clone)]
pub struct LocalModulusSolver {
    recovery: Arc<ModulusRecovery>,
}

impl LocalModulusSolver {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            recovery: Arc::new(ModulusRecovery::new(config)),
        }
    }
}

#[async_trait::async_trait]
impl ModulusSolver for LocalModulusSolver {
    async fn solve(
        &self,
        a: SignatureRecord,
        b: SignatureRecord,
    ) -> Result<Option<RecoveredKey>, RecoveryError> {
        let recovery = Arc::clone(&self.recovery);
        tokio::task::spawn_blocking(move || recovery.recover(&a, &b))
            .await
            .map_err(|e| RecoveryError::SolverUnavailable(e.to_string()))?
    }
}
