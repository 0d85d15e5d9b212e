use serde::{Deserialize, Serialize};

use crate::models::{Job, JobOutput, JobStatus, SynthesisRequest};

/// Тело запроса `POST /run`
#[derive(Debug, Serialize)]
pub struct RunPodRequest<'a> {
    pub input: RunPodInput<'a>,
}

#[derive(Debug, Serialize)]
pub struct RunPodInput<'a> {
    pub text: &'a str,
    pub speaker: &'a str,
    pub top_k: u32,
    pub temperature: f32,
    pub use_mbd: bool,
    pub filename: &'a str,
}

impl<'a> From<&'a SynthesisRequest> for RunPodRequest<'a> {
    fn from(request: &'a SynthesisRequest) -> Self {
        Self {
            input: RunPodInput {
                text: request.text(),
                speaker: request.speaker().as_str(),
                top_k: request.top_k(),
                temperature: request.temperature(),
                use_mbd: request.use_multi_band_diffusion(),
                filename: request.filename().unwrap_or("output"),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPodStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    #[serde(other)]
    Unknown,
}

/// Ответ на `/run` и `/status/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct RunPodResponse {
    #[serde(default)]
    pub id: String,
    pub status: RunPodStatus,
    #[serde(default)]
    pub output: Option<JobOutput>,
    /// RunPod puts handler exceptions here rather than in `output`
    #[serde(default)]
    pub error: Option<String>,
}

impl RunPodResponse {
    pub fn into_job(self) -> Job {
        let (status, fallback_error) = match self.status {
            RunPodStatus::InQueue => (JobStatus::Queued, None),
            RunPodStatus::InProgress => (JobStatus::InProgress, None),
            RunPodStatus::Completed => (JobStatus::Completed, None),
            RunPodStatus::Failed => (JobStatus::Failed, None),
            RunPodStatus::Cancelled => (JobStatus::Failed, Some("Job was cancelled")),
            RunPodStatus::TimedOut => (JobStatus::Failed, Some("Job timed out on the server")),
            RunPodStatus::Unknown => (JobStatus::Failed, Some("Unexpected job status")),
        };

        let mut output = self.output;
        let error = self.error.or_else(|| fallback_error.map(str::to_string));
        if let Some(error) = error {
            let output = output.get_or_insert_with(JobOutput::default);
            if output.error.is_none() {
                output.error = Some(error);
            }
        }

        Job {
            id: self.id,
            status,
            output,
        }
    }
}

/// Ответ `/health`; счётчики воркеров и задач оставляем как есть
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthReport {
    #[serde(default)]
    pub jobs: serde_json::Value,
    #[serde(default)]
    pub workers: serde_json::Value,
}
