use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

pub const TOP_K_MIN: u32 = 1;
pub const TOP_K_MAX: u32 = 50;
pub const TEMPERATURE_MIN: f32 = 0.1;
pub const TEMPERATURE_MAX: f32 = 2.0;

/// Голоса, которые знает удалённая модель
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    #[default]
    Osim,
    Geek,
    Shaul,
}

impl Speaker {
    pub const ALL: [Speaker; 3] = [Speaker::Osim, Speaker::Geek, Speaker::Shaul];

    /// Wire value sent to the endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Osim => "osim",
            Self::Geek => "geek",
            Self::Shaul => "shaul",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Osim => "Osim",
            Self::Geek => "Geek",
            Self::Shaul => "Shaul",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Speaker {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Speaker::ALL
            .into_iter()
            .find(|speaker| speaker.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::ValidationError(format!("Unknown speaker: {}", s)))
    }
}

/// Voice settings shared by the text field and the file list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceParameters {
    pub speaker: Speaker,
    pub top_k: u32,
    pub temperature: f32,
    pub use_mbd: bool,
}

impl Default for VoiceParameters {
    fn default() -> Self {
        Self {
            speaker: Speaker::Osim,
            top_k: 50,
            temperature: 1.0,
            use_mbd: true,
        }
    }
}

impl VoiceParameters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn validate(&self) -> AppResult<()> {
        if !(TOP_K_MIN..=TOP_K_MAX).contains(&self.top_k) {
            return Err(AppError::ValidationError(format!(
                "top_k must be between {} and {}, got {}",
                TOP_K_MIN, TOP_K_MAX, self.top_k
            )));
        }
        // NaN не попадает ни в один диапазон
        if !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&self.temperature) {
            return Err(AppError::ValidationError(format!(
                "temperature must be between {} and {}, got {}",
                TEMPERATURE_MIN, TEMPERATURE_MAX, self.temperature
            )));
        }
        Ok(())
    }
}

/// A validated synthesis request. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    text: String,
    voice: VoiceParameters,
    filename: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice: VoiceParameters) -> AppResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Please enter text to synthesize".to_string(),
            ));
        }
        voice.validate()?;
        Ok(Self {
            text,
            voice,
            filename: None,
        })
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        self.filename = (!filename.trim().is_empty()).then_some(filename);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> &VoiceParameters {
        &self.voice
    }

    pub fn speaker(&self) -> Speaker {
        self.voice.speaker
    }

    pub fn top_k(&self) -> u32 {
        self.voice.top_k
    }

    pub fn temperature(&self) -> f32 {
        self.voice.temperature
    }

    pub fn use_multi_band_diffusion(&self) -> bool {
        self.voice.use_mbd
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Результат, который сервер кладёт в `output`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub audio_base64: Option<String>,
    pub filename: Option<String>,
    pub sample_rate: Option<u32>,
    pub format: Option<String>,
    pub error: Option<String>,
}

/// Snapshot of a remote job as last reported by the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub output: Option<JobOutput>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn audio_base64(&self) -> Option<&str> {
        self.output
            .as_ref()
            .and_then(|output| output.audio_base64.as_deref())
            .filter(|payload| !payload.is_empty())
    }

    pub fn error_message(&self) -> Option<&str> {
        self.output.as_ref().and_then(|output| output.error.as_deref())
    }
}
