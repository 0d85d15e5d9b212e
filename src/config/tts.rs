use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Настройки опроса для генерации из текстового поля
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Interval between status checks
    pub poll_interval: Duration,
    /// `None` polls until the job reaches a terminal state
    pub max_poll_attempts: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_poll_attempts: None,
        }
    }
}

/// Настройки пакетной обработки файлов
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Upper bound of files submitted concurrently
    pub batch_size: usize,
    /// Pause between two consecutive batches
    pub inter_batch_delay: Duration,
    pub poll_interval: Duration,
    /// 150 x 2s is roughly five minutes per job
    pub max_poll_attempts: u32,
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Backoff before retry `n` is `backoff_base * 2^n`
    pub backoff_base: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            inter_batch_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 150,
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl BatchConfig {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    pub generation: GenerationConfig,
    pub batch: BatchConfig,
}
