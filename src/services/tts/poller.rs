//! Опрос статуса задачи до терминального состояния.
//!
//! [`JobPoller::poll`] returns a lazy stream: nothing is requested until the
//! stream is polled, and dropping it (or cancelling its token) stops polling
//! at the next suspension point without leaving timers behind.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, error, warn};
use tokio_util::sync::CancellationToken;

use crate::models::Job;
use crate::services::runpod::SynthesisApi;

/// What to do when a status request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollErrorPolicy {
    /// Log and close the stream without emitting anything.
    Close,
    /// Log and try again on the next tick.
    Skip,
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub error_policy: PollErrorPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: None,
            error_policy: PollErrorPolicy::Close,
        }
    }
}

#[derive(Clone)]
pub struct JobPoller {
    api: Arc<dyn SynthesisApi>,
    config: PollerConfig,
}

struct PollState {
    api: Arc<dyn SynthesisApi>,
    config: PollerConfig,
    job_id: String,
    token: CancellationToken,
    attempts: u32,
    failures: u32,
    finished: bool,
}

impl JobPoller {
    pub fn new(api: Arc<dyn SynthesisApi>, config: PollerConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Stream of status snapshots for `job_id`.
    ///
    /// Every tick waits one interval, asks for the status and emits it.
    /// A terminal snapshot is emitted last, after which the stream ends.
    pub fn poll(
        &self,
        job_id: impl Into<String>,
        token: CancellationToken,
    ) -> BoxStream<'static, Job> {
        let state = PollState {
            api: self.api.clone(),
            config: self.config.clone(),
            job_id: job_id.into(),
            token,
            attempts: 0,
            failures: 0,
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if state.finished || state.token.is_cancelled() {
                    return None;
                }
                if let Some(max) = state.config.max_attempts {
                    if state.attempts >= max {
                        warn!(
                            "Polling for job {} stopped after {} attempts",
                            state.job_id, state.attempts
                        );
                        return None;
                    }
                }

                tokio::select! {
                    biased;
                    _ = state.token.cancelled() => return None,
                    _ = tokio::time::sleep(state.config.interval) => {}
                }

                state.attempts += 1;
                let result = tokio::select! {
                    biased;
                    _ = state.token.cancelled() => return None,
                    result = state.api.get_status(&state.job_id) => result,
                };

                match result {
                    Ok(job) => {
                        debug!("Poll update for {}: {:?}", state.job_id, job.status);
                        state.finished = job.is_terminal();
                        return Some((job, state));
                    }
                    Err(e) => match state.config.error_policy {
                        PollErrorPolicy::Close => {
                            error!("Polling error for job {}: {}", state.job_id, e);
                            return None;
                        }
                        PollErrorPolicy::Skip => {
                            state.failures += 1;
                            if state.failures % 10 == 0 {
                                warn!(
                                    "Polling attempt {} failed for job {}: {}",
                                    state.attempts, state.job_id, e
                                );
                            } else {
                                debug!(
                                    "Polling attempt {} failed for job {}: {}",
                                    state.attempts, state.job_id, e
                                );
                            }
                        }
                    },
                }
            }
        })
        .boxed()
    }
}
