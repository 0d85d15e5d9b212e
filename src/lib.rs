//! # hebtts
//!
//! Клиент сервиса синтеза речи на иврите. Запросы отправляются в
//! удалённую очередь задач, статус опрашивается до результата.
//!
//! Two workflows share one job poller:
//! - [`services::tts::GenerationOrchestrator`] synthesizes a single text,
//!   one request at a time, with stop support.
//! - [`services::tts::BatchFileOrchestrator`] validates attached `.txt`
//!   files and submits them in bounded batches with per-file retry.

pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{AppConfig, BatchConfig, GenerationConfig, OrchestrationConfig};
pub use errors::{AppError, AppResult};
pub use events::{AppEvent, EventBus, NotificationLevel};
pub use models::{FileId, FileItem, FileStatus, Job, JobStatus, Speaker, VoiceParameters};
pub use services::runpod::{RunPodClient, SynthesisApi};
pub use services::tts::{
    BatchFileOrchestrator, BatchSummary, FileSource, GenerationOrchestrator, GenerationOutcome,
    GenerationPhase,
};
