use dashmap::DashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    api::BackendApi,
    models::{Job, JobStatus, StatusResponse, TerminalEvent},
};

/// Poll cadence of the reference behavior.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Tracks uploaded documents until the backend reports a terminal status.
///
/// Each tracker owns its job set, its timer task and its tick counter, so
/// independent trackers never cross-contaminate. The polling loop starts
/// with the first [`track`](JobTracker::track) call, polls every tracked
/// job sequentially once per tick, and terminates itself one tick after
/// the set drains.
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    api: Arc<dyn BackendApi>,
    jobs: DashMap<String, Job>,
    events: mpsc::UnboundedSender<TerminalEvent>,
    poll_interval: Duration,
    ticks: AtomicU64,
    poll_loop: Mutex<Option<JoinHandle<()>>>,
}

impl JobTracker {
    /// Tracker with the reference 2 s cadence. Returns the receiver for
    /// terminal events; exactly one event arrives per retired job.
    pub fn new(api: Arc<dyn BackendApi>) -> (Self, mpsc::UnboundedReceiver<TerminalEvent>) {
        Self::with_poll_interval(api, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        api: Arc<dyn BackendApi>,
        poll_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TerminalEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let tracker = Self {
            inner: Arc::new(TrackerInner {
                api,
                jobs: DashMap::new(),
                events,
                poll_interval,
                ticks: AtomicU64::new(0),
                poll_loop: Mutex::new(None),
            }),
        };
        (tracker, receiver)
    }

    /// Register a job for polling and make sure the loop is running.
    /// Tracking an id that is already tracked is a no-op.
    pub fn track(&self, job_id: impl Into<String>, display_name: impl Into<String>) {
        let id = job_id.into();
        let mut inserted = false;
        self.inner.jobs.entry(id.clone()).or_insert_with(|| {
            inserted = true;
            Job {
                id: id.clone(),
                display_name: display_name.into(),
                status: JobStatus::Queued,
                progress: 10,
            }
        });
        if inserted {
            info!(job_id = %id, "tracking processing job");
        } else {
            debug!(job_id = %id, "job already tracked; ignoring duplicate");
        }
        self.ensure_polling();
    }

    /// Idempotently halt the polling loop. Tracked jobs stay registered and
    /// resume polling on the next [`track`](JobTracker::track) call.
    pub fn stop(&self) {
        if let Some(handle) = self.inner.poll_loop.lock().unwrap().take() {
            handle.abort();
            info!("job polling loop stopped");
        }
    }

    /// Run one poll pass over every tracked job. The loop calls this once
    /// per tick; tests call it directly.
    pub async fn poll_once(&self) {
        self.inner.poll_once().await;
    }

    /// Snapshot of the tracked jobs, for presentation.
    pub fn jobs(&self) -> Vec<Job> {
        self.inner
            .jobs
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn is_tracking(&self, job_id: &str) -> bool {
        self.inner.jobs.contains_key(job_id)
    }

    pub fn is_polling(&self) -> bool {
        self.inner
            .poll_loop
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of timer ticks the loop has observed since construction.
    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }

    fn ensure_polling(&self) {
        let mut slot = self.inner.poll_loop.lock().unwrap();
        let running = slot.as_ref().is_some_and(|handle| !handle.is_finished());
        if running {
            return;
        }
        debug!(interval = ?self.inner.poll_interval, "starting job polling loop");
        *slot = Some(tokio::spawn(poll_loop(self.inner.clone())));
    }
}

async fn poll_loop(inner: Arc<TrackerInner>) {
    let mut ticker = time::interval_at(
        time::Instant::now() + inner.poll_interval,
        inner.poll_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        inner.ticks.fetch_add(1, Ordering::Relaxed);
        if inner.jobs.is_empty() {
            // Confirm emptiness under the handle lock: a concurrent track()
            // either sees a live loop here or finds the slot cleared and
            // starts a fresh one.
            let mut slot = inner.poll_loop.lock().unwrap();
            if inner.jobs.is_empty() {
                slot.take();
                debug!("no jobs left; polling loop stopping");
                return;
            }
            continue;
        }
        inner.poll_once().await;
    }
}

impl TrackerInner {
    /// Polls the snapshot of ids captured at pass start, sequentially, so
    /// updates for one job always apply in request order.
    async fn poll_once(&self) {
        let ids: Vec<String> = self.jobs.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            match self.api.document_status(&id).await {
                Ok(update) => self.apply_update(&id, update),
                // Transient poll failures are absorbed: the job stays
                // tracked and is retried on the next tick, without backoff.
                Err(e) => warn!(job_id = %id, error = %e, "status poll failed"),
            }
        }
    }

    fn apply_update(&self, job_id: &str, update: StatusResponse) {
        let terminal = {
            let Some(mut job) = self.jobs.get_mut(job_id) else {
                // Untracked while the request was in flight (stop/retire).
                return;
            };
            job.progress = if update.status.is_terminal() {
                update.progress
            } else {
                // Progress never regresses while a job is still running.
                job.progress.max(update.progress)
            };
            job.status = update.status;
            update.status.is_terminal()
        };

        if !terminal {
            return;
        }
        if let Some((_, job)) = self.jobs.remove(job_id) {
            info!(job_id = %job.id, status = ?job.status, "job reached terminal status");
            let event = TerminalEvent {
                job_id: job.id,
                filename: job.display_name,
                status: job.status,
            };
            if self.events.send(event).is_err() {
                debug!("terminal event receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockBackend;
    use crate::error::ClientError;

    fn status(filename: &str, status: JobStatus, progress: u8) -> StatusResponse {
        StatusResponse {
            filename: filename.to_string(),
            status,
            progress,
            error: None,
        }
    }

    fn tracker_with_mock(
        interval: Duration,
    ) -> (
        Arc<MockBackend>,
        JobTracker,
        mpsc::UnboundedReceiver<TerminalEvent>,
    ) {
        let api = Arc::new(MockBackend::new());
        let (tracker, events) = JobTracker::with_poll_interval(api.clone(), interval);
        (api, tracker, events)
    }

    #[tokio::test]
    async fn duplicate_track_keeps_single_entry() {
        let (_api, tracker, _events) = tracker_with_mock(Duration::from_secs(60));
        tracker.track("doc-1", "scan.pdf");
        tracker.track("doc-1", "scan-again.pdf");
        let jobs = tracker.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].display_name, "scan.pdf");
        tracker.stop();
    }

    #[tokio::test]
    async fn completed_poll_retires_job_and_emits_one_event() {
        let (api, tracker, mut events) = tracker_with_mock(Duration::from_secs(60));
        api.script_status(
            "doc-1",
            vec![
                Ok(status("scan.pdf", JobStatus::Processing, 30)),
                Ok(status("scan.pdf", JobStatus::Completed, 100)),
            ],
        );
        tracker.track("doc-1", "scan.pdf");
        tracker.stop();

        tracker.poll_once().await;
        assert!(tracker.is_tracking("doc-1"));
        assert_eq!(tracker.jobs()[0].status, JobStatus::Processing);

        tracker.poll_once().await;
        assert!(!tracker.is_tracking("doc-1"));

        let event = events.try_recv().unwrap();
        assert_eq!(
            event,
            TerminalEvent {
                job_id: "doc-1".to_string(),
                filename: "scan.pdf".to_string(),
                status: JobStatus::Completed,
            }
        );
        // Exactly one terminal event per job.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_poll_is_absorbed_and_job_stays_tracked() {
        let (api, tracker, mut events) = tracker_with_mock(Duration::from_secs(60));
        api.script_status(
            "doc-1",
            vec![
                Err(ClientError::Network("connection reset".to_string())),
                Ok(status("scan.pdf", JobStatus::Failed, 0)),
            ],
        );
        tracker.track("doc-1", "scan.pdf");
        tracker.stop();

        tracker.poll_once().await;
        assert!(tracker.is_tracking("doc-1"));
        assert!(events.try_recv().is_err());

        // Next pass retries the same id and observes the terminal failure.
        tracker.poll_once().await;
        assert!(!tracker.is_tracking("doc-1"));
        assert_eq!(events.try_recv().unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn progress_never_regresses_while_processing() {
        let (api, tracker, _events) = tracker_with_mock(Duration::from_secs(60));
        api.script_status(
            "doc-1",
            vec![
                Ok(status("scan.pdf", JobStatus::Processing, 70)),
                Ok(status("scan.pdf", JobStatus::Processing, 30)),
            ],
        );
        tracker.track("doc-1", "scan.pdf");
        tracker.stop();

        tracker.poll_once().await;
        assert_eq!(tracker.jobs()[0].progress, 70);
        tracker.poll_once().await;
        assert_eq!(tracker.jobs()[0].progress, 70);
    }

    #[tokio::test]
    async fn loop_self_stops_when_drained_and_restarts_on_track() {
        let (api, tracker, mut events) = tracker_with_mock(Duration::from_millis(20));
        api.script_status(
            "doc-1",
            vec![Ok(status("scan.pdf", JobStatus::Completed, 100))],
        );
        tracker.track("doc-1", "scan.pdf");
        assert!(tracker.is_polling());

        // First tick retires the job; the following tick finds the set
        // empty and stops the loop.
        let event = events.recv().await.unwrap();
        assert_eq!(event.job_id, "doc-1");
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!tracker.is_polling());
        let ticks_at_stop = tracker.ticks();
        assert!(ticks_at_stop >= 2);

        // Quiescent: the counter no longer advances.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(tracker.ticks(), ticks_at_stop);

        // A new job restarts the loop.
        api.script_status(
            "doc-2",
            vec![Ok(status("bill.png", JobStatus::Completed, 100))],
        );
        tracker.track("doc-2", "bill.png");
        assert!(tracker.is_polling());
        let event = events.recv().await.unwrap();
        assert_eq!(event.job_id, "doc-2");
        assert!(tracker.ticks() > ticks_at_stop);
        tracker.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_safe_when_not_running() {
        let (_api, tracker, _events) = tracker_with_mock(Duration::from_secs(60));
        tracker.stop();
        tracker.track("doc-1", "scan.pdf");
        tracker.stop();
        tracker.stop();
        assert!(!tracker.is_polling());
        // The job itself stays registered for a later restart.
        assert!(tracker.is_tracking("doc-1"));
    }

    #[tokio::test]
    async fn track_does_not_spawn_a_second_loop() {
        let (api, tracker, _events) = tracker_with_mock(Duration::from_millis(20));
        api.script_status(
            "doc-1",
            vec![Ok(status("scan.pdf", JobStatus::Processing, 30))],
        );
        tracker.track("doc-1", "scan.pdf");
        tracker.track("doc-2", "bill.png");
        tracker.track("doc-3", "form.jpg");
        assert!(tracker.is_polling());

        tokio::time::sleep(Duration::from_millis(50)).await;
        // One loop means tick count tracks wall time, not job count.
        assert!(tracker.ticks() <= 4);
        tracker.stop();
    }
}
