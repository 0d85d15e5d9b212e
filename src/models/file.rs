use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::utils::audio::AudioHandle;

static NEXT_FILE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Client-side identifier of an attached file. Never reused within a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn generate() -> Self {
        // Счётчик гарантирует уникальность, uuid делает id непредсказуемым между запусками
        let seq = NEXT_FILE_SEQ.fetch_add(1, Ordering::Relaxed);
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("file_{}_{}", seq, &suffix[..9]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Loading,
    Ready,
    Error,
    Processing,
    Success,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Success)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Processing => "processing",
            Self::Success => "success",
        };
        f.write_str(name)
    }
}

/// One attached text file and where it is in its lifecycle.
#[derive(Debug, Clone)]
pub struct FileItem {
    pub id: FileId,
    pub name: String,
    pub raw_content: Bytes,
    pub text_content: String,
    pub status: FileStatus,
    pub error: Option<String>,
    pub is_selected: bool,
    pub job_id: Option<String>,
    pub audio: Option<AudioHandle>,
}

impl FileItem {
    pub fn loading(name: impl Into<String>) -> Self {
        Self {
            id: FileId::generate(),
            name: name.into(),
            raw_content: Bytes::new(),
            text_content: String::new(),
            status: FileStatus::Loading,
            error: None,
            is_selected: false,
            job_id: None,
            audio: None,
        }
    }

    /// Move to `status`, keeping the per-status invariants: selection only
    /// survives in Ready, a job id only in Processing.
    pub fn set_status(&mut self, status: FileStatus) {
        self.status = status;
        if status != FileStatus::Ready {
            self.is_selected = false;
        }
        if status != FileStatus::Processing {
            self.job_id = None;
        }
    }

    pub fn mark_ready(&mut self, text: String) {
        self.text_content = text;
        self.error = None;
        self.set_status(FileStatus::Ready);
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.set_status(FileStatus::Error);
    }

    pub fn mark_success(&mut self, audio: AudioHandle) {
        self.audio = Some(audio);
        self.error = None;
        self.set_status(FileStatus::Success);
    }

    /// Name of the downloaded audio file: `chapter1.txt` -> `chapter1.wav`.
    pub fn audio_file_name(&self) -> String {
        format!("{}.wav", crate::utils::audio::file_stem(&self.name))
    }
}

/// Number of files per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub loading: usize,
    pub ready: usize,
    pub error: usize,
    pub processing: usize,
    pub success: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: FileStatus) {
        match status {
            FileStatus::Loading => self.loading += 1,
            FileStatus::Ready => self.ready += 1,
            FileStatus::Error => self.error += 1,
            FileStatus::Processing => self.processing += 1,
            FileStatus::Success => self.success += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.loading + self.ready + self.error + self.processing + self.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<FileId> = (0..1000).map(|_| FileId::generate()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.as_str().starts_with("file_")));
    }

    #[test]
    fn test_leaving_ready_clears_selection_and_job() {
        let mut item = FileItem::loading("a.txt");
        item.mark_ready("שלום".into());
        item.is_selected = true;

        item.set_status(FileStatus::Processing);
        assert!(!item.is_selected);
        item.job_id = Some("job-1".into());

        item.mark_error("boom");
        assert!(item.job_id.is_none());
        assert_eq!(item.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_audio_file_name() {
        let item = FileItem::loading("chapter1.txt");
        assert_eq!(item.audio_file_name(), "chapter1.wav");
    }
}
