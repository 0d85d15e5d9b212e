// Domain models module
// Contains core data structures used throughout the application

pub mod file;
pub mod tts;

// Экспортируем основные типы для удобства использования
pub use file::{FileId, FileItem, FileStatus, StatusCounts};
pub use tts::{Job, JobOutput, JobStatus, Speaker, SynthesisRequest, VoiceParameters};
