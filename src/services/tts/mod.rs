//! # Оркестрация синтеза речи
//!
//! Генерация из текстового поля ([`GenerationOrchestrator`]) и пакетная
//! обработка файлов ([`BatchFileOrchestrator`]) поверх общего опросчика
//! статуса задач ([`JobPoller`]).

pub mod batch;
pub mod generation;
pub mod poller;
pub mod store;

pub use batch::{BatchFileOrchestrator, BatchSummary, FileIntake, FileSource};
pub use generation::{GenerationOrchestrator, GenerationOutcome, GenerationPhase};
pub use poller::{JobPoller, PollErrorPolicy, PollerConfig};
pub use store::FileCollection;
