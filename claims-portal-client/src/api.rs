use async_trait::async_trait;
use reqwest::multipart;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;
use tracing::debug;

use crate::{
    error::{ClientError, Result},
    models::{
        ClaimDecision, ClaimRequest, DetailedExplanation, DocumentListResponse, DocumentSummary,
        DocumentType, StatusResponse, UploadResponse,
    },
    session::SessionContext,
};

/// HTTP surface of the claims backend consumed by this crate.
///
/// Everything above this trait is testable against a scripted
/// implementation; [`HttpBackend`] is the production one.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// `POST /upload` with multipart `file` + `doc_type`.
    async fn upload_document(
        &self,
        file_name: &str,
        content: Vec<u8>,
        doc_type: DocumentType,
    ) -> Result<UploadResponse>;

    /// `GET /status/{doc_id}`.
    async fn document_status(&self, doc_id: &str) -> Result<StatusResponse>;

    /// `GET /documents`.
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>>;

    /// `POST /claims/submit`. Runs to natural completion; the caller owns
    /// any deadline.
    async fn submit_claim(&self, request: &ClaimRequest) -> Result<ClaimDecision>;

    /// `GET /claims/{claim_id}/explanation`.
    async fn claim_explanation(&self, claim_id: &str) -> Result<DetailedExplanation>;
}

/// reqwest-backed implementation of [`BackendApi`].
pub struct HttpBackend {
    base_url: String,
    http: reqwest::Client,
    session: SessionContext,
}

impl HttpBackend {
    pub fn new(base_url: &str, session: SessionContext) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn transport_error(error: reqwest::Error) -> ClientError {
    ClientError::Network(error.to_string())
}

/// Non-2xx responses are uniform failures; their bodies are ignored.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::UnexpectedStatus(status.as_u16()))
    }
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn upload_document(
        &self,
        file_name: &str,
        content: Vec<u8>,
        doc_type: DocumentType,
    ) -> Result<UploadResponse> {
        debug!(file = %file_name, doc_type = doc_type.as_str(), "uploading document");
        let part = multipart::Part::bytes(content).file_name(file_name.to_string());
        let form = multipart::Form::new()
            .part("file", part)
            .text("doc_type", doc_type.as_str());

        // Upload is unauthenticated in the backend contract.
        let response = self
            .http
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        decode_json(check_status(response)?).await
    }

    async fn document_status(&self, doc_id: &str) -> Result<StatusResponse> {
        let response = self
            .http
            .get(self.url(&format!("/status/{doc_id}")))
            .headers(self.session.headers())
            .send()
            .await
            .map_err(transport_error)?;
        decode_json(check_status(response)?).await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let response = self
            .http
            .get(self.url("/documents"))
            .headers(self.session.headers())
            .send()
            .await
            .map_err(transport_error)?;
        let listing: DocumentListResponse = decode_json(check_status(response)?).await?;
        Ok(listing.documents)
    }

    async fn submit_claim(&self, request: &ClaimRequest) -> Result<ClaimDecision> {
        debug!(policy_id = %request.policy_id, "submitting claim");
        let response = self
            .http
            .post(self.url("/claims/submit"))
            .headers(self.session.headers())
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        decode_json(check_status(response)?).await
    }

    async fn claim_explanation(&self, claim_id: &str) -> Result<DetailedExplanation> {
        // Explanation is unauthenticated in the backend contract.
        let response = self
            .http
            .get(self.url(&format!("/claims/{claim_id}/explanation")))
            .send()
            .await
            .map_err(transport_error)?;
        decode_json(check_status(response)?).await
    }
}

/// Scripted backend used by the test suites: responses are queued per call,
/// status polls follow a per-document script, and every call is counted.
#[derive(Default)]
pub struct MockBackend {
    upload_results: Mutex<VecDeque<Result<UploadResponse>>>,
    status_scripts: Mutex<HashMap<String, StatusScript>>,
    submit_results: Mutex<VecDeque<Result<ClaimDecision>>>,
    submit_delay: Mutex<Option<Duration>>,
    explanation_results: Mutex<VecDeque<Result<DetailedExplanation>>>,
    documents: Mutex<Vec<DocumentSummary>>,
    upload_calls: AtomicUsize,
    status_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    explanation_calls: AtomicUsize,
}

#[derive(Default)]
struct StatusScript {
    queued: VecDeque<Result<StatusResponse>>,
    last: Option<Result<StatusResponse>>,
}

impl StatusScript {
    /// Pop the next scripted response; once exhausted, repeat the last one.
    fn next(&mut self) -> Option<Result<StatusResponse>> {
        if let Some(response) = self.queued.pop_front() {
            self.last = Some(response.clone());
            return Some(response);
        }
        self.last.clone()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_upload(&self, result: Result<UploadResponse>) {
        self.upload_results.lock().unwrap().push_back(result);
    }

    pub fn script_status(&self, doc_id: &str, responses: Vec<Result<StatusResponse>>) {
        let mut scripts = self.status_scripts.lock().unwrap();
        let script = scripts.entry(doc_id.to_string()).or_default();
        script.queued.extend(responses);
    }

    pub fn push_submit(&self, result: Result<ClaimDecision>) {
        self.submit_results.lock().unwrap().push_back(result);
    }

    /// Delay every subsequent submit; with an empty submit queue this
    /// simulates a backend that never answers within any sane deadline.
    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    pub fn push_explanation(&self, result: Result<DetailedExplanation>) {
        self.explanation_results.lock().unwrap().push_back(result);
    }

    pub fn set_documents(&self, documents: Vec<DocumentSummary>) {
        *self.documents.lock().unwrap() = documents;
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::Relaxed)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::Relaxed)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::Relaxed)
    }

    pub fn explanation_calls(&self) -> usize {
        self.explanation_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn upload_document(
        &self,
        file_name: &str,
        _content: Vec<u8>,
        _doc_type: DocumentType,
    ) -> Result<UploadResponse> {
        self.upload_calls.fetch_add(1, Ordering::Relaxed);
        self.upload_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ClientError::Network(format!(
                    "no scripted upload response for {file_name}"
                )))
            })
    }

    async fn document_status(&self, doc_id: &str) -> Result<StatusResponse> {
        self.status_calls.fetch_add(1, Ordering::Relaxed);
        let response = self
            .status_scripts
            .lock()
            .unwrap()
            .get_mut(doc_id)
            .and_then(StatusScript::next);
        // An unscripted document behaves like the backend's 404.
        response.unwrap_or(Err(ClientError::UnexpectedStatus(404)))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        Ok(self.documents.lock().unwrap().clone())
    }

    async fn submit_claim(&self, _request: &ClaimRequest) -> Result<ClaimDecision> {
        self.submit_calls.fetch_add(1, Ordering::Relaxed);
        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.submit_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ClientError::Network(
                    "no scripted submit response".to_string(),
                ))
            })
    }

    async fn claim_explanation(&self, claim_id: &str) -> Result<DetailedExplanation> {
        self.explanation_calls
            .fetch_add(1, Ordering::Relaxed);
        self.explanation_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ClientError::Network(format!(
                    "no scripted explanation for {claim_id}"
                )))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;

    fn processing(progress: u8) -> StatusResponse {
        StatusResponse {
            filename: "scan.pdf".to_string(),
            status: JobStatus::Processing,
            progress,
            error: None,
        }
    }

    #[tokio::test]
    async fn exhausted_status_script_repeats_last_response() {
        let backend = MockBackend::new();
        backend.script_status("doc-1", vec![Ok(processing(40))]);

        assert_eq!(backend.document_status("doc-1").await.unwrap().progress, 40);
        assert_eq!(backend.document_status("doc-1").await.unwrap().progress, 40);
        assert_eq!(backend.status_calls(), 2);
    }

    #[tokio::test]
    async fn unscripted_document_answers_like_a_404() {
        let backend = MockBackend::new();
        let result = backend.document_status("nope").await;
        assert!(matches!(result, Err(ClientError::UnexpectedStatus(404))));
    }

    #[tokio::test]
    async fn document_listing_returns_scripted_entries() {
        let backend = MockBackend::new();
        backend.set_documents(vec![DocumentSummary {
            doc_id: "doc-1".to_string(),
            filename: "policy.pdf".to_string(),
            doc_type: "policy".to_string(),
            status: "completed".to_string(),
            upload_time: "2024-03-09T10:00:00".to_string(),
            page_count: Some(12),
            entity_count: Some(34),
        }]);

        let documents = backend.list_documents().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].doc_id, "doc-1");
    }
}
