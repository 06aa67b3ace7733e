//! # Inbound Ports (Driving Ports / API)
//!
//! Traits that define the public API of the recovery pipeline.

use shared_types::{DomainSelector, SignatureRecord};

use crate::domain::entities::{BatchReport, GroupReport, PairOutcome};
use crate::domain::errors::PipelineError;

/// Primary Key Recovery API.
///
/// Only `PipelineError` escapes these calls; every other failure is recorded
/// against its pair and logged.
#[async_trait::async_trait]
pub trait KeyRecoveryApi: Send + Sync {
    /// Run the pair pipeline on two adjacent signatures of one group.
    async fn process_pair(
        &self,
        a: &SignatureRecord,
        b: &SignatureRecord,
    ) -> Result<PairOutcome, PipelineError>;

    /// Process every adjacent pair of one domain/selector, in timestamp
    /// order (undated signatures last).
    async fn process_group(
        &self,
        domain_selector: DomainSelector,
        signatures: Vec<SignatureRecord>,
    ) -> Result<GroupReport, PipelineError>;

    /// Group signatures by domain/selector and process the groups
    /// concurrently. Halts on the first `PipelineError`.
    async fn run_batch(&self, signatures: Vec<SignatureRecord>)
        -> Result<BatchReport, PipelineError>;
}
