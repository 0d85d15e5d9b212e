//! Проверка содержимого текстовых файлов перед синтезом.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{AppError, AppResult};

/// Hebrew block, direction marks, digits, whitespace and basic punctuation.
static ALLOWED_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[\x{0590}-\x{05FF}\x{200F}\x{200E}\s0-9.,!?;:()\-"'`]+$"#)
        .expect("allowed text pattern is valid")
});

static HEBREW_CHAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{0590}-\x{05FF}]").expect("hebrew char pattern is valid"));

/// Minimum share of Hebrew letters among non-whitespace characters.
pub const MIN_HEBREW_RATIO: f64 = 0.3;

/// Validate that `text` is predominantly Hebrew and return it trimmed.
pub fn validate_hebrew_text(text: &str) -> AppResult<String> {
    let clean = text.trim();
    if clean.is_empty() {
        return Err(AppError::ValidationError(
            "File is empty or contains no readable text".to_string(),
        ));
    }

    if !ALLOWED_TEXT.is_match(clean) {
        return Err(AppError::ValidationError(
            "File contains non-Hebrew characters. Only Hebrew, numbers, and basic punctuation are allowed"
                .to_string(),
        ));
    }

    let hebrew = HEBREW_CHAR.find_iter(clean).count();
    let total = clean.chars().filter(|c| !c.is_whitespace()).count();
    if (hebrew as f64) < total as f64 * MIN_HEBREW_RATIO {
        return Err(AppError::ValidationError(
            "File does not contain enough Hebrew text".to_string(),
        ));
    }

    Ok(clean.to_string())
}

/// Decode raw file bytes as UTF-8, dropping a leading byte order mark.
pub fn decode_text(raw: &[u8]) -> AppResult<String> {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    String::from_utf8(raw.to_vec())
        .map_err(|_| AppError::ValidationError("Failed to read file as text".to_string()))
}
