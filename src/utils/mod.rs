pub mod audio;
pub mod hebrew;
pub mod logger;

pub use audio::AudioHandle;
pub use hebrew::validate_hebrew_text;
