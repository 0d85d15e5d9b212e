//! Генерация речи из текстового поля: один запрос за раз.
//!
//! Phases: `Idle -> Submitting -> (Polling) -> Done`, with `Cancelled`
//! reachable from Submitting/Polling through [`GenerationOrchestrator::stop`].
//! Each `generate` call gets a run number; a continuation only writes state
//! if its run is still the current one and still in the phase it expects.

use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::poller::{JobPoller, PollErrorPolicy, PollerConfig};
use crate::config::GenerationConfig;
use crate::errors::{AppError, AppResult};
use crate::events::{AppEvent, EventBus};
use crate::models::{Job, JobStatus, SynthesisRequest, VoiceParameters};
use crate::services::runpod::SynthesisApi;
use crate::utils::audio::AudioHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationPhase {
    Idle,
    Submitting,
    Polling,
    Done,
    Cancelled,
}

impl GenerationPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Submitting | Self::Polling)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed(AudioHandle),
    Failed(String),
    Cancelled,
}

#[derive(Debug)]
struct GenerationState {
    phase: GenerationPhase,
    run: u64,
    job_id: Option<String>,
    token: Option<CancellationToken>,
    audio: Option<AudioHandle>,
    error: Option<String>,
}

impl Default for GenerationState {
    fn default() -> Self {
        Self {
            phase: GenerationPhase::Idle,
            run: 0,
            job_id: None,
            token: None,
            audio: None,
            error: None,
        }
    }
}

#[derive(Clone)]
pub struct GenerationOrchestrator {
    api: Arc<dyn SynthesisApi>,
    poller: JobPoller,
    events: EventBus,
    state: Arc<Mutex<GenerationState>>,
}

impl GenerationOrchestrator {
    pub fn new(api: Arc<dyn SynthesisApi>, config: GenerationConfig, events: EventBus) -> Self {
        let poller = JobPoller::new(
            api.clone(),
            PollerConfig {
                interval: config.poll_interval,
                max_attempts: config.max_poll_attempts,
                error_policy: PollErrorPolicy::Close,
            },
        );
        Self {
            api,
            poller,
            events,
            state: Arc::new(Mutex::new(GenerationState::default())),
        }
    }

    pub fn phase(&self) -> GenerationPhase {
        self.state.lock().phase
    }

    pub fn is_generating(&self) -> bool {
        self.phase().is_active()
    }

    pub fn audio(&self) -> Option<AudioHandle> {
        self.state.lock().audio.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn job_id(&self) -> Option<String> {
        self.state.lock().job_id.clone()
    }

    /// Synthesize `text` and wait for the result.
    ///
    /// Blank text and a call while another generation is running are
    /// rejected with an error and leave the state untouched. Everything that
    /// happens after submission ends up in the returned outcome. Dropping the
    /// future mid-run has the same effect as [`stop`](Self::stop).
    pub async fn generate(
        &self,
        text: impl Into<String>,
        voice: VoiceParameters,
    ) -> AppResult<GenerationOutcome> {
        let request = match SynthesisRequest::new(text, voice) {
            Ok(request) => request,
            Err(e) => {
                self.events.error(e.to_string());
                return Err(e);
            }
        };

        let (run, token) = {
            let mut state = self.state.lock();
            if state.phase.is_active() {
                return Err(AppError::GenerationInProgress);
            }
            let token = CancellationToken::new();
            state.run += 1;
            state.phase = GenerationPhase::Submitting;
            state.job_id = None;
            state.audio = None;
            state.error = None;
            state.token = Some(token.clone());
            (state.run, token)
        };
        self.emit_phase(GenerationPhase::Submitting);
        debug!("Generation run {} submitting", run);

        // Если future бросят посреди запуска, guard сам переводит его в Cancelled
        let guard = RunGuard {
            orchestrator: self.clone(),
            run,
            armed: true,
        };
        let outcome = self.drive(run, &token, &request).await;
        guard.disarm();
        Ok(outcome)
    }

    async fn drive(
        &self,
        run: u64,
        token: &CancellationToken,
        request: &SynthesisRequest,
    ) -> GenerationOutcome {
        // Ждём ответ даже после stop(): без id удалённую задачу не отменить
        let submitted = self.api.submit(request).await;

        if !self.is_current(run, GenerationPhase::Submitting) {
            if let Ok(job) = &submitted {
                if !job.is_terminal() && !job.id.is_empty() {
                    self.spawn_cancel(job.id.clone());
                }
            }
            return GenerationOutcome::Cancelled;
        }

        let job = match submitted {
            Ok(job) => job,
            Err(e) => {
                warn!("Generation error: {}", e);
                let message = match &e {
                    AppError::ConfigurationError(_) => e.to_string(),
                    _ => format!(
                        "Failed to generate speech. Please check your connection and try again. ({})",
                        e
                    ),
                };
                return self.finish(run, Err(message));
            }
        };

        if job.is_terminal() {
            return self.finish(run, job_result(&job));
        }
        if job.id.is_empty() {
            return self.finish(run, Err("No job ID returned from server".to_string()));
        }

        {
            let mut state = self.state.lock();
            if state.run != run || state.phase != GenerationPhase::Submitting {
                return GenerationOutcome::Cancelled;
            }
            state.phase = GenerationPhase::Polling;
            state.job_id = Some(job.id.clone());
        }
        self.emit_phase(GenerationPhase::Polling);
        self.events.info(format!("Job started - ID: {}", job.id));

        let mut updates = self.poller.poll(job.id.clone(), token.child_token());
        while let Some(update) = updates.next().await {
            if !self.is_current(run, GenerationPhase::Polling) {
                return GenerationOutcome::Cancelled;
            }
            if update.is_terminal() {
                return self.finish(run, job_result(&update));
            }
            debug!("Job {} is {:?}", update.id, update.status);
        }

        if token.is_cancelled() || !self.is_current(run, GenerationPhase::Polling) {
            return GenerationOutcome::Cancelled;
        }
        self.finish(run, Err("Error polling job status".to_string()))
    }

    /// Stop the running generation. Returns `false` if nothing was running.
    ///
    /// The local state flips to Cancelled immediately; the remote cancel is
    /// sent in the background and its failure is only logged.
    pub fn stop(&self) -> bool {
        self.cancel_run(None)
    }

    /// Flip an active run to Cancelled. With `Some(run)` only that run is
    /// touched, a newer one is left alone.
    fn cancel_run(&self, expected: Option<u64>) -> bool {
        let (job_id, token) = {
            let mut state = self.state.lock();
            if !state.phase.is_active() || expected.is_some_and(|run| run != state.run) {
                return false;
            }
            state.phase = GenerationPhase::Cancelled;
            (state.job_id.clone(), state.token.take())
        };

        if let Some(token) = token {
            token.cancel();
        }
        self.emit_phase(GenerationPhase::Cancelled);
        self.events.info("Generation stopped");

        if let Some(job_id) = job_id {
            self.spawn_cancel(job_id);
        }
        true
    }

    fn is_current(&self, run: u64, phase: GenerationPhase) -> bool {
        let state = self.state.lock();
        state.run == run && state.phase == phase
    }

    fn finish(&self, run: u64, result: Result<AudioHandle, String>) -> GenerationOutcome {
        {
            let mut state = self.state.lock();
            if state.run != run || !state.phase.is_active() {
                debug!("Dropping stale result of generation run {}", run);
                return GenerationOutcome::Cancelled;
            }
            state.phase = GenerationPhase::Done;
            state.token = None;
            match &result {
                Ok(audio) => state.audio = Some(audio.clone()),
                Err(message) => state.error = Some(message.clone()),
            }
        }
        self.emit_phase(GenerationPhase::Done);

        match result {
            Ok(audio) => {
                self.events.success("Speech generated successfully!");
                GenerationOutcome::Completed(audio)
            }
            Err(message) => {
                self.events.error(format!("Generation failed: {}", message));
                GenerationOutcome::Failed(message)
            }
        }
    }

    fn emit_phase(&self, phase: GenerationPhase) {
        self.events.emit(AppEvent::GenerationPhaseChanged { phase });
    }

    fn spawn_cancel(&self, job_id: String) {
        spawn_remote_cancel(self.api.clone(), job_id);
    }
}

/// Cancels its run on drop unless disarmed.
struct RunGuard {
    orchestrator: GenerationOrchestrator,
    run: u64,
    armed: bool,
}

impl RunGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.armed && self.orchestrator.cancel_run(Some(self.run)) {
            warn!("Generation run {} dropped while running, cancelled", self.run);
        }
    }
}

fn job_result(job: &Job) -> Result<AudioHandle, String> {
    match job.status {
        JobStatus::Completed => AudioHandle::from_job(job).map_err(|e| e.to_string()),
        _ => Err(job.error_message().unwrap_or("Unknown error").to_string()),
    }
}

/// Fire-and-forget `cancel` on the remote queue.
pub(crate) fn spawn_remote_cancel(api: Arc<dyn SynthesisApi>, job_id: String) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!("No runtime available to cancel job {}", job_id);
        return;
    };
    handle.spawn(async move {
        match api.cancel(&job_id).await {
            Ok(()) => info!("Remote job {} cancelled", job_id),
            Err(e) => warn!("Failed to cancel job {}: {}", job_id, e),
        }
    });
}
