use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{info, warn};

use crate::{
    api::BackendApi,
    error::{ClientError, Result},
    models::{ClaimDecision, ClaimRequest, DetailedExplanation},
};

/// Client-enforced deadline of the reference behavior.
pub const DEFAULT_SUBMIT_DEADLINE: Duration = Duration::from_secs(60);

/// Presentation-facing lifecycle phase of the single active claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPhase {
    /// Interactive: the submission surface is enabled.
    Form,
    /// One submission is in flight; the surface is disabled.
    Submitting,
    /// A decision is held and displayed.
    Decision,
    /// The detailed explanation overlays the decision.
    DetailedExplanation,
}

/// Drives one claim through submit → decision → optional detailed
/// explanation.
///
/// Mutating operations take `&mut self`, so a single orchestrator can never
/// have two submissions in flight; the phase tells the presentation layer
/// when to re-enable its submission surface. Every failure path lands back
/// in an interactive phase.
pub struct ClaimOrchestrator {
    api: Arc<dyn BackendApi>,
    deadline: Duration,
    phase: ClaimPhase,
    decision: Option<ClaimDecision>,
}

impl ClaimOrchestrator {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        Self::with_deadline(api, DEFAULT_SUBMIT_DEADLINE)
    }

    pub fn with_deadline(api: Arc<dyn BackendApi>, deadline: Duration) -> Self {
        Self {
            api,
            deadline,
            phase: ClaimPhase::Form,
            decision: None,
        }
    }

    pub fn phase(&self) -> ClaimPhase {
        self.phase
    }

    /// The decision of the most recent successful submission, if any.
    pub fn decision(&self) -> Option<&ClaimDecision> {
        self.decision.as_ref()
    }

    /// Submit a claim: one attempt, bounded by the configured deadline.
    ///
    /// Invalid input fails fast with [`ClientError::Validation`] before any
    /// network call. Deadline expiry drops the in-flight request and returns
    /// [`ClientError::Timeout`], distinct from other network failures so the
    /// caller can say "taking longer than expected" instead of a generic
    /// error. There is no automatic retry; resubmission is the user's call.
    pub async fn submit(&mut self, request: ClaimRequest) -> Result<ClaimDecision> {
        validate(&request)?;

        self.phase = ClaimPhase::Submitting;
        info!(policy_id = %request.policy_id, claimed_amount = request.claimed_amount, "submitting claim");

        match time::timeout(self.deadline, self.api.submit_claim(&request)).await {
            Err(_elapsed) => {
                self.phase = ClaimPhase::Form;
                warn!(deadline = ?self.deadline, "claim submission deadline elapsed; request aborted");
                Err(ClientError::Timeout(self.deadline))
            }
            Ok(Err(e)) => {
                self.phase = ClaimPhase::Form;
                warn!(error = %e, "claim submission failed");
                Err(e)
            }
            Ok(Ok(decision)) => {
                info!(
                    claim_id = %decision.claim_id,
                    decision = ?decision.decision,
                    approved_amount = decision.approved_amount,
                    "claim decided"
                );
                self.decision = Some(decision.clone());
                self.phase = ClaimPhase::Decision;
                Ok(decision)
            }
        }
    }

    /// Fetch the detailed explanation for a decided claim. No client-side
    /// deadline; a failure leaves the current phase and the stored decision
    /// untouched.
    pub async fn fetch_explanation(&mut self, claim_id: &str) -> Result<DetailedExplanation> {
        let explanation = self.api.claim_explanation(claim_id).await?;
        if self.phase == ClaimPhase::Decision {
            self.phase = ClaimPhase::DetailedExplanation;
        }
        Ok(explanation)
    }

    /// Close the explanation view, returning to the decision.
    pub fn dismiss_explanation(&mut self) {
        if self.phase == ClaimPhase::DetailedExplanation {
            self.phase = ClaimPhase::Decision;
        }
    }
}

fn validate(request: &ClaimRequest) -> Result<()> {
    if request.policy_id.trim().is_empty() {
        return Err(ClientError::Validation(
            "policy_id must not be empty".to_string(),
        ));
    }
    if !request.claimed_amount.is_finite() || request.claimed_amount <= 0.0 {
        return Err(ClientError::Validation(
            "claimed_amount must be a positive number".to_string(),
        ));
    }
    Ok(())
}
