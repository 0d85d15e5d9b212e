// Services module
// Contains business logic separated by domain areas

pub mod runpod; // Remote job queue client
pub mod tts;    // Generation and batch orchestration
