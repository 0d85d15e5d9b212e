//! Работа с аудио, которое возвращает сервер синтеза.
//!
//! The endpoint answers with a base64 encoded WAV file. [`AudioHandle`] keeps
//! the decoded bytes around so they can be played, inspected or written to disk.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use log::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::models::{Job, JobOutput};

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Decoded synthesis output.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioHandle {
    data: Bytes,
    file_name: Option<String>,
    sample_rate: Option<u32>,
    format: String,
}

impl AudioHandle {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            file_name: None,
            sample_rate: None,
            format: "wav".to_string(),
        }
    }

    /// Decode a base64 payload, picking up the metadata the server sent next to it.
    pub fn from_base64(payload: &str, output: Option<&JobOutput>) -> AppResult<Self> {
        let data = general_purpose::STANDARD.decode(payload.trim())?;
        if data.is_empty() {
            return Err(AppError::AudioDecodeError("empty audio payload".to_string()));
        }
        debug!("Decoded {} bytes of audio", data.len());

        let mut handle = Self::from_bytes(data);
        if let Some(output) = output {
            handle.file_name = output.filename.clone();
            handle.sample_rate = output.sample_rate;
            if let Some(format) = output.format.as_deref().filter(|f| !f.is_empty()) {
                handle.format = format.to_lowercase();
            }
        }
        Ok(handle)
    }

    /// Audio of a completed job. A COMPLETED job without a payload is an error.
    pub fn from_job(job: &Job) -> AppResult<Self> {
        let payload = job.audio_base64().ok_or_else(|| {
            AppError::JobFailure(format!("Job {} completed without audio output", job.id))
        })?;
        Self::from_base64(payload, job.output.as_ref())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn mime_type(&self) -> &'static str {
        WAV_MIME_TYPE
    }

    /// Sample rate reported by the server, falling back to the WAV header.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
            .or_else(|| self.wav_spec().ok().map(|spec| spec.sample_rate))
    }

    pub fn wav_spec(&self) -> AppResult<hound::WavSpec> {
        let reader = hound::WavReader::new(Cursor::new(self.data.as_ref()))
            .map_err(|e| AppError::AudioDecodeError(format!("not a WAV file: {}", e)))?;
        Ok(reader.spec())
    }

    pub fn duration_secs(&self) -> AppResult<f32> {
        let reader = hound::WavReader::new(Cursor::new(self.data.as_ref()))
            .map_err(|e| AppError::AudioDecodeError(format!("not a WAV file: {}", e)))?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(AppError::AudioDecodeError("WAV header has zero sample rate".into()));
        }
        Ok(reader.duration() as f32 / spec.sample_rate as f32)
    }

    pub async fn save_to(&self, path: impl AsRef<Path>) -> AppResult<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &self.data).await?;
        info!("Saved {} bytes of audio to {}", self.data.len(), path.display());
        Ok(path.to_path_buf())
    }
}

/// Name used for audio generated from the text field: `hebtts_<millis>.wav`.
pub fn default_file_name() -> String {
    format!("hebtts_{}.wav", chrono::Utc::now().timestamp_millis())
}

/// `chapter1.txt` -> `chapter1`. Used both as the remote filename and for downloads.
pub fn file_stem(name: &str) -> String {
    let stem = name.strip_suffix(".txt").unwrap_or(name);
    if stem.trim().is_empty() {
        "output".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
pub(crate) fn test_wav_bytes(sample_rate: u32, samples: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..samples {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

#[cfg(test)]
pub(crate) fn test_wav_base64() -> String {
    general_purpose::STANDARD.encode(test_wav_bytes(24_000, 2_400))
}
