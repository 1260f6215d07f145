//! Caption generation settings.
//!
//! A settings snapshot is captured at submission time and stored on the
//! task as JSONB; changing settings means submitting a new task.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Hard cap on generated caption length, matching the strictest platform.
pub const MAX_CAPTION_LENGTH: u32 = 2_200;

/// Maximum hashtags any platform accepts per post.
pub const MAX_HASHTAGS: u8 = 30;

/// Maximum length for free-form generator guidance.
pub const MAX_INSTRUCTIONS_LEN: u64 = 1_000;

/// Settings snapshot for one caption generation run.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CaptionSettings {
    /// Voice preset forwarded to the generator, e.g. "casual", "professional".
    #[validate(length(min = 1, max = 64))]
    pub tone: String,

    /// Upper bound on generated caption length in characters.
    #[validate(range(min = 1, max = 2200))]
    pub max_length: u32,

    /// Number of hashtags to append (0 disables).
    #[validate(range(max = 30))]
    pub hashtag_count: u8,

    /// BCP-47 language tag for the generated caption.
    #[validate(length(min = 2, max = 16))]
    pub language: String,

    /// Append a call-to-action line.
    #[serde(default)]
    pub include_cta: bool,

    /// Free-form guidance forwarded verbatim to the generator.
    #[validate(length(max = 1000))]
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            tone: "casual".to_string(),
            max_length: 400,
            hashtag_count: 5,
            language: "en".to_string(),
            include_cta: false,
            custom_instructions: None,
        }
    }
}

impl CaptionSettings {
    /// Validate the snapshot before any write happens.
    pub fn ensure_valid(&self) -> Result<(), CoreError> {
        Validate::validate(self).map_err(|e| CoreError::Validation(e.to_string()))
    }
}
