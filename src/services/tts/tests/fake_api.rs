//! Скриптуемая замена удалённой очереди задач для тестов оркестраторов.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::errors::{AppError, AppResult};
use crate::models::{Job, JobOutput, JobStatus, SynthesisRequest};
use crate::services::runpod::{HealthReport, SynthesisApi};
use crate::utils::audio::test_wav_base64;

type SubmitFn = Box<dyn Fn(&SynthesisRequest, usize) -> AppResult<Job> + Send + Sync>;
type StatusFn = Box<dyn Fn(&str, usize) -> AppResult<Job> + Send + Sync>;

/// By default every submit returns a queued `job-<n>` and every status
/// request reports it completed with a short WAV payload.
pub struct FakeApi {
    submit_fn: SubmitFn,
    status_fn: StatusFn,
    submit_delay: Duration,
    status_delay: Duration,
    fail_cancel: bool,
    submitted: Mutex<Vec<SynthesisRequest>>,
    status_calls: Mutex<HashMap<String, usize>>,
    cancelled: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            submit_fn: Box::new(|_, idx| Ok(queued(&format!("job-{}", idx)))),
            status_fn: Box::new(|id, _| Ok(completed(id))),
            submit_delay: Duration::ZERO,
            status_delay: Duration::ZERO,
            fail_cancel: false,
            submitted: Mutex::new(Vec::new()),
            status_calls: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// `f` gets the request and the zero-based submit number.
    pub fn on_submit(
        mut self,
        f: impl Fn(&SynthesisRequest, usize) -> AppResult<Job> + Send + Sync + 'static,
    ) -> Self {
        self.submit_fn = Box::new(f);
        self
    }

    /// `f` gets the job id and the zero-based number of status calls made
    /// for that job so far.
    pub fn on_status(
        mut self,
        f: impl Fn(&str, usize) -> AppResult<Job> + Send + Sync + 'static,
    ) -> Self {
        self.status_fn = Box::new(f);
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    pub fn failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn submitted(&self) -> Vec<SynthesisRequest> {
        self.submitted.lock().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().len()
    }

    pub fn status_calls(&self, job_id: &str) -> usize {
        self.status_calls.lock().get(job_id).copied().unwrap_or(0)
    }

    pub fn total_status_calls(&self) -> usize {
        self.status_calls.lock().values().sum()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }
}

#[async_trait::async_trait]
impl SynthesisApi for FakeApi {
    async fn submit(&self, request: &SynthesisRequest) -> AppResult<Job> {
        let idx = {
            let mut submitted = self.submitted.lock();
            submitted.push(request.clone());
            submitted.len() - 1
        };
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        (self.submit_fn)(request, idx)
    }

    async fn get_status(&self, job_id: &str) -> AppResult<Job> {
        let idx = {
            let mut calls = self.status_calls.lock();
            let count = calls.entry(job_id.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        (self.status_fn)(job_id, idx)
    }

    async fn cancel(&self, job_id: &str) -> AppResult<()> {
        self.cancelled.lock().push(job_id.to_string());
        if self.fail_cancel {
            return Err(AppError::TransportError("HTTP error! status: 500".to_string()));
        }
        Ok(())
    }

    async fn health(&self) -> AppResult<HealthReport> {
        Ok(HealthReport {
            jobs: serde_json::json!({ "inQueue": 0 }),
            workers: serde_json::json!({ "idle": 1 }),
        })
    }
}

pub fn queued(id: &str) -> Job {
    Job {
        id: id.to_string(),
        status: JobStatus::Queued,
        output: None,
    }
}

pub fn in_progress(id: &str) -> Job {
    Job {
        id: id.to_string(),
        status: JobStatus::InProgress,
        output: None,
    }
}

pub fn completed(id: &str) -> Job {
    Job {
        id: id.to_string(),
        status: JobStatus::Completed,
        output: Some(JobOutput {
            audio_base64: Some(test_wav_base64()),
            filename: Some("output.wav".to_string()),
            sample_rate: Some(24_000),
            format: Some("wav".to_string()),
            error: None,
        }),
    }
}

pub fn failed(id: &str, message: &str) -> Job {
    Job {
        id: id.to_string(),
        status: JobStatus::Failed,
        output: Some(JobOutput {
            error: Some(message.to_string()),
            ..Default::default()
        }),
    }
}

pub fn transport_error() -> AppError {
    AppError::TransportError("connection refused".to_string())
}
