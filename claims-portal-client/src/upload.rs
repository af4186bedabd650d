use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    api::BackendApi,
    error::{ClientError, Result},
    models::DocumentType,
    tracker::JobTracker,
};

/// File extensions the backend accepts for upload.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tiff", "bmp", "txt"];

/// One user-selected file queued for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub doc_type: DocumentType,
    pub content: Vec<u8>,
}

/// Result of one file's upload attempt. On success carries the job id the
/// tracker is now polling.
#[derive(Debug)]
pub struct UploadOutcome {
    pub file_name: String,
    pub result: Result<String>,
}

/// Turns a batch of user-selected files into tracked processing jobs.
pub struct UploadDispatcher {
    api: Arc<dyn BackendApi>,
    tracker: JobTracker,
}

impl UploadDispatcher {
    pub fn new(api: Arc<dyn BackendApi>, tracker: JobTracker) -> Self {
        Self { api, tracker }
    }

    /// Upload each file in turn and register every returned job id with the
    /// tracker. One file's failure never aborts the rest of the batch.
    pub async fn dispatch(&self, files: Vec<UploadFile>) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let file_name = file.file_name.clone();
            let result = self.upload_one(file).await;
            if let Err(e) = &result {
                warn!(file = %file_name, error = %e, "upload failed");
            }
            outcomes.push(UploadOutcome { file_name, result });
        }
        outcomes
    }

    async fn upload_one(&self, file: UploadFile) -> Result<String> {
        check_extension(&file.file_name)?;
        let UploadFile {
            file_name,
            doc_type,
            content,
        } = file;
        let response = self
            .api
            .upload_document(&file_name, content, doc_type)
            .await?;
        info!(doc_id = %response.doc_id, file = %file_name, "document uploaded; processing job tracked");
        self.tracker.track(response.doc_id.clone(), file_name);
        Ok(response.doc_id)
    }
}

/// Rejects obviously unsupported files before any bytes go on the wire.
fn check_extension(file_name: &str) -> Result<()> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ClientError::Validation(format!(
            "unsupported file type: {file_name}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockBackend;
    use crate::models::UploadResponse;

    fn upload_ok(doc_id: &str, filename: &str) -> UploadResponse {
        UploadResponse {
            doc_id: doc_id.to_string(),
            filename: filename.to_string(),
            status: "uploaded".to_string(),
            message: None,
        }
    }

    fn file(name: &str) -> UploadFile {
        UploadFile {
            file_name: name.to_string(),
            doc_type: DocumentType::HospitalBill,
            content: b"%PDF-1.4".to_vec(),
        }
    }

    fn dispatcher() -> (Arc<MockBackend>, UploadDispatcher, JobTracker) {
        let api = Arc::new(MockBackend::new());
        let (tracker, _events) = JobTracker::with_poll_interval(
            api.clone(),
            std::time::Duration::from_secs(60),
        );
        let dispatcher = UploadDispatcher::new(api.clone(), tracker.clone());
        (api, dispatcher, tracker)
    }

    #[tokio::test]
    async fn successful_uploads_become_tracked_jobs() {
        let (api, dispatcher, tracker) = dispatcher();
        api.push_upload(Ok(upload_ok("doc-1", "bill.pdf")));
        api.push_upload(Ok(upload_ok("doc-2", "scan.png")));

        let outcomes = dispatcher
            .dispatch(vec![file("bill.pdf"), file("scan.png")])
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert!(tracker.is_tracking("doc-1"));
        assert!(tracker.is_tracking("doc-2"));
        tracker.stop();
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let (api, dispatcher, tracker) = dispatcher();
        api.push_upload(Err(ClientError::UnexpectedStatus(500)));
        api.push_upload(Ok(upload_ok("doc-2", "scan.png")));

        let outcomes = dispatcher
            .dispatch(vec![file("bill.pdf"), file("scan.png")])
            .await;

        assert!(outcomes[0].result.is_err());
        assert_eq!(outcomes[1].result.as_deref().unwrap(), "doc-2");
        assert!(!tracker.is_tracking("doc-1"));
        assert!(tracker.is_tracking("doc-2"));
        tracker.stop();
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected_without_network() {
        let (api, dispatcher, tracker) = dispatcher();

        let outcomes = dispatcher.dispatch(vec![file("malware.exe")]).await;

        assert!(matches!(
            outcomes[0].result,
            Err(ClientError::Validation(_))
        ));
        assert_eq!(api.upload_calls(), 0);
        assert!(tracker.jobs().is_empty());
        tracker.stop();
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(check_extension("SCAN.PDF").is_ok());
        assert!(check_extension("photo.JPeG").is_ok());
        assert!(check_extension("noextension").is_err());
        assert!(check_extension("archive.zip").is_err());
    }
}
