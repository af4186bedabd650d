use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Processing state the backend reports for an uploaded document.
///
/// The set is closed: a status string outside it fails deserialization
/// instead of silently falling through a string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal statuses end a job's tracked lifetime.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One document's asynchronous processing task, tracked until terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub display_name: String,
    pub status: JobStatus,
    pub progress: u8,
}

/// Emitted exactly once when a tracked job reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalEvent {
    pub job_id: String,
    pub filename: String,
    pub status: JobStatus,
}

/// Document categories accepted by the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Policy,
    ClaimForm,
    HospitalBill,
    SurveyorReport,
    DischargeSummary,
    Fir,
    Photo,
    Other,
}

impl DocumentType {
    /// Wire name used for the `doc_type` multipart field.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Policy => "policy",
            DocumentType::ClaimForm => "claim_form",
            DocumentType::HospitalBill => "hospital_bill",
            DocumentType::SurveyorReport => "surveyor_report",
            DocumentType::DischargeSummary => "discharge_summary",
            DocumentType::Fir => "fir",
            DocumentType::Photo => "photo",
            DocumentType::Other => "other",
        }
    }
}

/// Body of a successful `POST /upload`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub doc_id: String,
    pub filename: String,
    /// Initial lifecycle note from the backend ("uploaded"); the polled
    /// status endpoint is the authoritative source from here on.
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of a successful `GET /status/{doc_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub filename: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default)]
    pub error: Option<String>,
}

/// One entry of `GET /documents`.
///
/// The listing reports the backend's full pipeline vocabulary
/// (ocr_complete, extraction_complete, ...), wider than [`JobStatus`],
/// so the status stays a plain string here.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentSummary {
    pub doc_id: String,
    pub filename: String,
    pub doc_type: String,
    pub status: String,
    pub upload_time: String,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub entity_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DocumentListResponse {
    pub documents: Vec<DocumentSummary>,
}

/// Treatment categories the adjudication engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentType {
    Appendicitis,
    Cardiac,
    Orthopedic,
    Dental,
    Maternity,
    Accident,
    GeneralSurgery,
    Hospitalization,
    Other,
}

/// A claim submission. Transient: exists for one attempt and is never
/// retried automatically.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimRequest {
    pub policy_id: String,
    pub treatment_type: TreatmentType,
    pub claimed_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hospital_name: Option<String>,
    #[serde(with = "treatment_date_format", skip_serializing_if = "Option::is_none")]
    pub treatment_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The backend's `DD/MM/YYYY` treatment-date wire format.
mod treatment_date_format {
    use chrono::NaiveDate;
    use serde::Serializer;

    const FORMAT: &str = "%d/%m/%Y";

    pub fn serialize<S: Serializer>(
        date: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => serializer.serialize_str(&date.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }
}

/// Adjudication outcome for a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Approved,
    Rejected,
    UnderReview,
}

/// Explanation embedded in every [`ClaimDecision`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub reason: String,
    #[serde(default)]
    pub calculation_details: HashMap<String, f64>,
    #[serde(default)]
    pub relevant_clauses: Vec<String>,
    pub confidence_score: f64,
}

/// Decision returned by `POST /claims/submit`. Immutable once received;
/// superseded only by the next submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimDecision {
    pub claim_id: String,
    pub policy_id: String,
    pub treatment_type: String,
    pub claimed_amount: f64,
    pub approved_amount: f64,
    pub decision: ClaimStatus,
    pub explanation: Explanation,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub processing_time_ms: Option<u64>,
}

/// Richer explanation fetched lazily per claim id; not cached beyond its
/// display lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedExplanation {
    pub decision_summary: String,
    pub reasoning: Reasoning,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub confidence_level: Option<ConfidenceLevel>,
    #[serde(default)]
    pub audit_trail: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reasoning {
    pub primary_reason: String,
    #[serde(default)]
    pub decision_factors: Vec<DecisionFactor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionFactor {
    pub factor: String,
    pub value: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceLevel {
    pub level: String,
    pub score: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_snake_case_wire_names() {
        let status: JobStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(status, JobStatus::Processing);
        assert!(!status.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
    }

    #[test]
    fn unknown_status_is_a_decode_error_not_a_fallthrough() {
        let result = serde_json::from_str::<JobStatus>("\"ocr_complete\"");
        assert!(result.is_err());
    }

    #[test]
    fn claim_request_serializes_snake_case_with_ddmmyyyy_date() {
        let request = ClaimRequest {
            policy_id: "POL-123".to_string(),
            treatment_type: TreatmentType::Cardiac,
            claimed_amount: 25_000.0,
            hospital_name: Some("City Hospital".to_string()),
            treatment_date: NaiveDate::from_ymd_opt(2024, 3, 9),
            description: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["policy_id"], "POL-123");
        assert_eq!(value["treatment_type"], "cardiac");
        assert_eq!(value["claimed_amount"], 25_000.0);
        assert_eq!(value["treatment_date"], "09/03/2024");
        // Absent optionals stay off the wire entirely.
        assert!(value.get("description").is_none());
    }

    #[test]
    fn claim_decision_roundtrips_backend_shape() {
        let body = serde_json::json!({
            "claim_id": "C1",
            "policy_id": "P1",
            "treatment_type": "cardiac",
            "claimed_amount": 500.0,
            "approved_amount": 500.0,
            "decision": "approved",
            "explanation": {
                "reason": "Within coverage limit",
                "calculation_details": {"coverage_limit": 500000.0},
                "relevant_clauses": ["Clause 4.2"],
                "confidence_score": 0.95
            },
            "timestamp": "2024-03-09T10:00:00",
            "processing_time_ms": 42
        });

        let decision: ClaimDecision = serde_json::from_value(body).unwrap();
        assert_eq!(decision.decision, ClaimStatus::Approved);
        assert_eq!(decision.explanation.relevant_clauses.len(), 1);
        assert_eq!(
            decision.explanation.calculation_details["coverage_limit"],
            500000.0
        );
    }

    #[test]
    fn detailed_explanation_tolerates_missing_optional_sections() {
        let body = serde_json::json!({
            "decision_summary": "Approved for the full amount",
            "reasoning": {"primary_reason": "Below auto-approval threshold"}
        });

        let explanation: DetailedExplanation = serde_json::from_value(body).unwrap();
        assert!(explanation.next_steps.is_empty());
        assert!(explanation.audit_trail.is_none());
        assert!(explanation.reasoning.decision_factors.is_empty());
    }
}
