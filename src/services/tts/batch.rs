//! Пакетная обработка текстовых файлов.
//!
//! Each attached file is a [`FileItem`] with its own state machine:
//!
//! ```text
//! Loading -> Ready | Error
//! Ready -> Processing -> Success | Error | Ready (stop)
//! Error -> Ready (manual retry)
//! ```
//!
//! Files are submitted in bounded batches. Inside a batch every file runs
//! concurrently on the caller's task; batches run one after another. Every
//! asynchronous write goes through [`FileCollection::update_if`] so a file
//! that was stopped or removed meanwhile is never overwritten.

use std::collections::{HashMap, HashSet};
use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::StreamExt;
use futures::future::{BoxFuture, join_all};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::generation::spawn_remote_cancel;
use super::poller::{JobPoller, PollErrorPolicy, PollerConfig};
use super::store::FileCollection;
use crate::config::BatchConfig;
use crate::errors::{AppError, AppResult};
use crate::events::{AppEvent, EventBus};
use crate::models::{
    FileId, FileItem, FileStatus, JobStatus, StatusCounts, SynthesisRequest, VoiceParameters,
};
use crate::services::runpod::SynthesisApi;
use crate::utils::audio::{AudioHandle, file_stem};
use crate::utils::hebrew::{decode_text, validate_hebrew_text};

/// Where the content of an attached file comes from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Memory { name: String, content: Bytes },
    Path(PathBuf),
}

impl FileSource {
    pub fn memory(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self::Memory {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn path(path: impl AsRef<Path>) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    pub fn name(&self) -> String {
        match self {
            Self::Memory { name, .. } => name.clone(),
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }

    async fn read(&self) -> AppResult<Bytes> {
        match self {
            Self::Memory { content, .. } => Ok(content.clone()),
            Self::Path(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
        }
    }
}

/// Files registered by [`BatchFileOrchestrator::add_files`] whose content
/// has not been read yet. Await it (or call [`FileIntake::load`]) to read
/// and validate them.
#[must_use = "files stay Loading until the intake is awaited"]
pub struct FileIntake {
    orchestrator: BatchFileOrchestrator,
    pending: Vec<(FileId, FileSource)>,
}

impl FileIntake {
    pub fn ids(&self) -> Vec<FileId> {
        self.pending.iter().map(|(id, _)| id.clone()).collect()
    }

    pub async fn load(self) -> Vec<FileId> {
        let ids = self.ids();
        let orchestrator = self.orchestrator;
        join_all(
            self.pending
                .into_iter()
                .map(|(id, source)| orchestrator.load_file(id, source)),
        )
        .await;
        ids
    }
}

impl IntoFuture for FileIntake {
    type Output = Vec<FileId>;
    type IntoFuture = BoxFuture<'static, Vec<FileId>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.load())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Stopped or removed while in flight
    pub abandoned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Succeeded,
    Failed,
    Abandoned,
}

#[derive(Clone)]
pub struct BatchFileOrchestrator {
    api: Arc<dyn SynthesisApi>,
    config: BatchConfig,
    files: FileCollection,
    // Токены отмены файлов в обработке; номер отличает повторный запуск того же файла
    tokens: Arc<Mutex<HashMap<FileId, (u64, CancellationToken)>>>,
    next_token: Arc<AtomicU64>,
    events: EventBus,
}

impl BatchFileOrchestrator {
    pub fn new(api: Arc<dyn SynthesisApi>, config: BatchConfig, events: EventBus) -> Self {
        Self {
            api,
            config,
            files: FileCollection::new(),
            tokens: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
            events,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn files(&self) -> Vec<FileItem> {
        self.files.snapshot()
    }

    pub fn file(&self, id: &FileId) -> Option<FileItem> {
        self.files.get(id)
    }

    pub fn counts(&self) -> StatusCounts {
        self.files.counts()
    }

    pub fn selected_files(&self) -> Vec<FileItem> {
        self.files
            .snapshot()
            .into_iter()
            .filter(|item| item.status == FileStatus::Ready && item.is_selected)
            .collect()
    }

    /// Register `inputs` as Loading files right away. Reading and validation
    /// happen when the returned intake is awaited, each file independently.
    pub fn add_files(&self, inputs: impl IntoIterator<Item = FileSource>) -> FileIntake {
        let pending: Vec<(FileItem, FileSource)> = inputs
            .into_iter()
            .map(|source| (FileItem::loading(source.name()), source))
            .collect();

        self.files.insert(pending.iter().map(|(item, _)| item.clone()));
        for (item, _) in &pending {
            self.emit_status(&item.id);
        }
        info!("Added {} file(s)", pending.len());

        FileIntake {
            orchestrator: self.clone(),
            pending: pending
                .into_iter()
                .map(|(item, source)| (item.id, source))
                .collect(),
        }
    }

    async fn load_file(&self, id: FileId, source: FileSource) {
        let (raw, result) = match source.read().await {
            Ok(raw) => {
                let result = decode_text(&raw).and_then(|text| validate_hebrew_text(&text));
                (raw, result)
            }
            Err(e) => (Bytes::new(), Err(e)),
        };

        let applied = self.files.update_if(&id, &[FileStatus::Loading], |item| {
            item.raw_content = raw;
            match result {
                Ok(text) => item.mark_ready(text),
                Err(e) => item.mark_error(e.to_string()),
            }
        });

        if applied {
            self.emit_status(&id);
        } else {
            debug!("File {} changed while loading, dropping read result", id);
        }
    }

    pub fn toggle_file_selection(&self, id: &FileId) -> bool {
        self.files
            .update_if(id, &[FileStatus::Ready], |item| item.is_selected = !item.is_selected)
    }

    pub fn select_all_files(&self) {
        self.files.update_all(|item| {
            if item.status == FileStatus::Ready {
                item.is_selected = true;
            }
        });
    }

    pub fn clear_selection(&self) {
        self.files.update_all(|item| {
            if item.status == FileStatus::Ready {
                item.is_selected = false;
            }
        });
    }

    /// Revert a Loading or Processing file to Ready. The remote job, if any,
    /// gets a best-effort cancel that nobody waits for.
    pub fn stop_file(&self, id: &FileId) -> bool {
        let mut job_id = None;
        let stopped = self.files.update_if(
            id,
            &[FileStatus::Processing, FileStatus::Loading],
            |item| {
                job_id = item.job_id.take();
                item.error = None;
                item.set_status(FileStatus::Ready);
            },
        );
        if !stopped {
            return false;
        }

        self.cancel_token(id);
        self.emit_status(id);
        if let Some(job_id) = job_id {
            spawn_remote_cancel(self.api.clone(), job_id);
        }
        info!("Stopped file {}", id);
        true
    }

    /// Stop every Loading or Processing file.
    pub fn stop_all(&self) -> usize {
        self.files
            .snapshot()
            .into_iter()
            .filter(|item| matches!(item.status, FileStatus::Processing | FileStatus::Loading))
            .filter(|item| self.stop_file(&item.id))
            .count()
    }

    /// Remove a file whatever its status. In-flight work for it is abandoned.
    pub fn remove_file(&self, id: &FileId) -> bool {
        let Some(item) = self.files.remove(id) else {
            return false;
        };
        self.abandon(item);
        true
    }

    pub fn remove_all_files(&self) -> usize {
        let removed = self.files.clear();
        let count = removed.len();
        for item in removed {
            self.abandon(item);
        }
        count
    }

    fn abandon(&self, item: FileItem) {
        self.cancel_token(&item.id);
        if let Some(job_id) = item.job_id {
            spawn_remote_cancel(self.api.clone(), job_id);
        }
        self.events.emit(AppEvent::FileRemoved { id: item.id });
    }

    /// Put a failed file back to Ready so it can be processed again. Files
    /// that never passed validation stay in Error.
    pub fn retry_file(&self, id: &FileId) -> bool {
        let retried = self.files.update_where(
            id,
            |item| item.status == FileStatus::Error && !item.text_content.is_empty(),
            |item| {
                item.error = None;
                item.set_status(FileStatus::Ready);
            },
        );
        if retried {
            self.emit_status(id);
        }
        retried
    }

    pub fn retry_failed(&self) -> usize {
        self.files
            .snapshot()
            .into_iter()
            .filter(|item| item.status == FileStatus::Error)
            .filter(|item| self.retry_file(&item.id))
            .count()
    }

    /// Synthesize every Ready file among `ids`.
    ///
    /// All of them move to Processing at once, then they are submitted in
    /// batches of at most `batch_size`. One file running out of retries never
    /// affects the others. Ready files without text (stopped while loading)
    /// are skipped. Dropping the returned future puts the files it still
    /// holds back to Ready and cancels their remote jobs.
    pub async fn process_files(
        &self,
        ids: &[FileId],
        voice: &VoiceParameters,
    ) -> AppResult<BatchSummary> {
        voice.validate()?;

        let wanted: HashSet<FileId> = ids
            .iter()
            .filter(|id| match self.files.get(id) {
                Some(item) if item.status == FileStatus::Ready && item.text_content.is_empty() => {
                    warn!("Skipping {}: no text loaded", item.name);
                    false
                }
                _ => true,
            })
            .cloned()
            .collect();
        let started = self
            .files
            .transition_many(&wanted, FileStatus::Ready, FileStatus::Processing);
        if started.is_empty() {
            debug!("Nothing to process");
            return Ok(BatchSummary::default());
        }

        let mut registered = Vec::with_capacity(started.len());
        {
            let mut tokens = self.tokens.lock();
            for item in &started {
                let seq = self.next_token.fetch_add(1, Ordering::Relaxed);
                let token = CancellationToken::new();
                tokens.insert(item.id.clone(), (seq, token.clone()));
                registered.push((item.clone(), seq, token));
            }
        }
        for item in &started {
            self.emit_status(&item.id);
        }
        let guard = ProcessingGuard {
            orchestrator: self.clone(),
            entries: registered
                .iter()
                .map(|(item, seq, _)| (item.id.clone(), *seq))
                .collect(),
            armed: true,
        };

        let batch_size = self.config.batch_size.max(1).min(registered.len());
        let batches: Vec<_> = registered.chunks(batch_size).collect();
        let total = batches.len();
        info!(
            "Processing {} file(s) in {} batch(es) of up to {}",
            registered.len(),
            total,
            batch_size
        );

        let mut summary = BatchSummary::default();
        for (index, batch) in batches.into_iter().enumerate() {
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|(item, seq, token)| self.run_file(item, *seq, token, voice)),
            )
            .await;

            let succeeded = outcomes.iter().filter(|o| **o == FileOutcome::Succeeded).count();
            let failed = outcomes.iter().filter(|o| **o == FileOutcome::Failed).count();
            summary.succeeded += succeeded;
            summary.failed += failed;
            summary.abandoned += outcomes.len() - succeeded - failed;

            info!("Batch completed: {} successful, {} failed", succeeded, failed);
            self.events.emit(AppEvent::BatchCompleted {
                index,
                total,
                succeeded,
                failed,
            });

            if index + 1 < total {
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
        }

        guard.disarm();
        Ok(summary)
    }

    async fn run_file(
        &self,
        item: &FileItem,
        seq: u64,
        token: &CancellationToken,
        voice: &VoiceParameters,
    ) -> FileOutcome {
        let outcome = self.process_file(item, token, voice).await;
        self.release_token(&item.id, seq);
        outcome
    }

    async fn process_file(
        &self,
        item: &FileItem,
        token: &CancellationToken,
        voice: &VoiceParameters,
    ) -> FileOutcome {
        let request = match SynthesisRequest::new(item.text_content.clone(), voice.clone()) {
            Ok(request) => request.with_filename(file_stem(&item.name)),
            Err(e) => return self.fail_file(&item.id, e.to_string()),
        };

        let mut attempt: u32 = 0;
        loop {
            if token.is_cancelled() || !self.files.has_status(&item.id, FileStatus::Processing) {
                return FileOutcome::Abandoned;
            }

            let error = match self.submit_and_poll(item, &request, token).await {
                Ok(Some(audio)) => {
                    let applied = self.files.update_if(&item.id, &[FileStatus::Processing], |f| {
                        f.mark_success(audio)
                    });
                    if !applied {
                        return FileOutcome::Abandoned;
                    }
                    self.emit_status(&item.id);
                    info!("Generated audio for {}", item.name);
                    return FileOutcome::Succeeded;
                }
                Ok(None) => return FileOutcome::Abandoned,
                Err(e) => e,
            };

            attempt += 1;
            if !error.is_retryable() {
                return self.fail_file(&item.id, error.to_string());
            }
            if attempt > self.config.max_retries {
                return self.fail_file(
                    &item.id,
                    format!("Failed after {} attempts: {}", attempt, error),
                );
            }

            let wait = self.config.backoff_for(attempt);
            warn!(
                "Attempt {} failed for {}, retrying in {:?}: {}",
                attempt, item.name, wait, error
            );
            tokio::select! {
                biased;
                _ = token.cancelled() => return FileOutcome::Abandoned,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// One submit-and-poll attempt. `Ok(None)` means the file was stopped or
    /// removed meanwhile and the result must be dropped.
    async fn submit_and_poll(
        &self,
        item: &FileItem,
        request: &SynthesisRequest,
        token: &CancellationToken,
    ) -> AppResult<Option<AudioHandle>> {
        let job = self.api.submit(request).await?;

        if token.is_cancelled() {
            if !job.is_terminal() && !job.id.is_empty() {
                spawn_remote_cancel(self.api.clone(), job.id);
            }
            return Ok(None);
        }

        match job.status {
            JobStatus::Completed => return AudioHandle::from_job(&job).map(Some),
            JobStatus::Failed => return Err(job_failure(job.error_message())),
            JobStatus::Queued | JobStatus::InProgress => {}
        }
        if job.id.is_empty() {
            return Err(AppError::Other("No job ID returned from server".to_string()));
        }

        let job_id = job.id;
        let recorded = self.files.update_if(&item.id, &[FileStatus::Processing], |f| {
            f.job_id = Some(job_id.clone())
        });
        if !recorded {
            spawn_remote_cancel(self.api.clone(), job_id);
            return Ok(None);
        }
        debug!("File {} is job {}", item.name, job_id);

        let poller = JobPoller::new(
            self.api.clone(),
            PollerConfig {
                interval: self.config.poll_interval,
                max_attempts: Some(self.config.max_poll_attempts),
                error_policy: PollErrorPolicy::Skip,
            },
        );
        let mut updates = poller.poll(job_id.clone(), token.child_token());
        while let Some(update) = updates.next().await {
            if token.is_cancelled() || !self.files.has_status(&item.id, FileStatus::Processing) {
                return Ok(None);
            }
            match update.status {
                JobStatus::Completed => return AudioHandle::from_job(&update).map(Some),
                JobStatus::Failed => return Err(job_failure(update.error_message())),
                JobStatus::Queued | JobStatus::InProgress => {}
            }
        }

        if token.is_cancelled() {
            return Ok(None);
        }
        // Задача может ещё выполняться на сервере, перед повтором отменяем её
        spawn_remote_cancel(self.api.clone(), job_id);
        Err(AppError::TimeoutError(
            "Job timeout - processing took too long".to_string(),
        ))
    }

    fn fail_file(&self, id: &FileId, message: String) -> FileOutcome {
        let applied = self
            .files
            .update_if(id, &[FileStatus::Processing], |item| item.mark_error(message));
        if applied {
            self.emit_status(id);
            FileOutcome::Failed
        } else {
            FileOutcome::Abandoned
        }
    }

    fn cancel_token(&self, id: &FileId) {
        let entry = self.tokens.lock().remove(id);
        if let Some((_, token)) = entry {
            token.cancel();
        }
    }

    fn release_token(&self, id: &FileId, seq: u64) {
        let mut tokens = self.tokens.lock();
        if tokens.get(id).is_some_and(|(current, _)| *current == seq) {
            tokens.remove(id);
        }
    }

    /// Revert files still Processing under token `seq` to Ready, cancelling
    /// their tokens and remote jobs.
    fn release_abandoned(&self, entries: &[(FileId, u64)]) -> usize {
        let mut released = 0;
        for (id, seq) in entries {
            let token = {
                let mut tokens = self.tokens.lock();
                if tokens.get(id).is_some_and(|(current, _)| current == seq) {
                    tokens.remove(id)
                } else {
                    None
                }
            };
            let Some((_, token)) = token else {
                continue;
            };
            token.cancel();

            let mut job_id = None;
            let reverted = self.files.update_if(id, &[FileStatus::Processing], |item| {
                job_id = item.job_id.take();
                item.error = None;
                item.set_status(FileStatus::Ready);
            });
            if reverted {
                self.emit_status(id);
                released += 1;
            }
            if let Some(job_id) = job_id {
                spawn_remote_cancel(self.api.clone(), job_id);
            }
        }
        released
    }

    fn emit_status(&self, id: &FileId) {
        if let Some(item) = self.files.get(id) {
            self.events.emit(AppEvent::FileStatusChanged {
                id: item.id,
                status: item.status,
                error: item.error,
            });
        }
    }

    /// Write the audio of a finished file to `dir/<name>.wav`.
    pub async fn save_audio(&self, id: &FileId, dir: impl AsRef<Path>) -> AppResult<PathBuf> {
        let item = self
            .files
            .get(id)
            .ok_or_else(|| AppError::Other(format!("Unknown file: {}", id)))?;
        let audio = match (item.status, &item.audio) {
            (FileStatus::Success, Some(audio)) => audio.clone(),
            _ => {
                return Err(AppError::Other(format!(
                    "File {} has no generated audio",
                    item.name
                )));
            }
        };
        audio.save_to(dir.as_ref().join(item.audio_file_name())).await
    }

    pub async fn save_all_successful(&self, dir: impl AsRef<Path>) -> AppResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let mut saved = Vec::new();
        for item in self.files.snapshot() {
            if item.status == FileStatus::Success && item.audio.is_some() {
                saved.push(self.save_audio(&item.id, dir).await?);
            }
        }
        Ok(saved)
    }
}

/// Releases the files of an interrupted `process_files` call on drop.
struct ProcessingGuard {
    orchestrator: BatchFileOrchestrator,
    entries: Vec<(FileId, u64)>,
    armed: bool,
}

impl ProcessingGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let released = self.orchestrator.release_abandoned(&self.entries);
        if released > 0 {
            warn!("Processing dropped, {} file(s) back to Ready", released);
        }
    }
}

fn job_failure(message: Option<&str>) -> AppError {
    AppError::JobFailure(message.unwrap_or("Job failed on server").to_string())
}
