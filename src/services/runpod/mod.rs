// Remote synthesis client
// Talks to the RunPod-style job queue that hosts the Hebrew TTS model

pub mod api;
pub mod models;

pub use api::RunPodClient;
pub use models::HealthReport;

use crate::errors::AppResult;
use crate::models::{Job, SynthesisRequest};

/// Trait for the remote job queue. Implementations hold no per-job state.
#[async_trait::async_trait]
pub trait SynthesisApi: Send + Sync {
    /// Submit a request. The returned job is either already terminal or
    /// carries the id to poll.
    async fn submit(&self, request: &SynthesisRequest) -> AppResult<Job>;

    async fn get_status(&self, job_id: &str) -> AppResult<Job>;

    /// Best effort; callers log the error and carry on.
    async fn cancel(&self, job_id: &str) -> AppResult<()>;

    async fn health(&self) -> AppResult<HealthReport>;
}
