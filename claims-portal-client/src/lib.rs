pub mod api;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod session;
pub mod tracker;
pub mod upload;

// Re-export commonly used types
pub use api::{BackendApi, HttpBackend, MockBackend};
pub use error::{ClientError, Result};
pub use models::{
    ClaimDecision, ClaimRequest, ClaimStatus, ConfidenceLevel, DecisionFactor,
    DetailedExplanation, DocumentSummary, DocumentType, Explanation, Job, JobStatus, Reasoning,
    StatusResponse, TerminalEvent, TreatmentType, UploadResponse,
};
pub use orchestrator::{ClaimOrchestrator, ClaimPhase, DEFAULT_SUBMIT_DEADLINE};
pub use tracker::{DEFAULT_POLL_INTERVAL, JobTracker};
pub use upload::{SUPPORTED_EXTENSIONS, UploadDispatcher, UploadFile, UploadOutcome};
pub use session::SessionContext;
