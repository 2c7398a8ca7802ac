use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of every description produced by a failed captioning call.
pub const CAPTION_FAILURE_MARKER: &str = "[caption failed]";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionResult {
    pub description: String,
    /// Empty when the backend gave no Chinese text and translation is still
    /// needed.
    #[serde(default)]
    pub zh: String,
}

impl CaptionResult {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            zh: String::new(),
        }
    }

    pub fn failure(detail: impl std::fmt::Display) -> Self {
        Self::new(format!("{} {}", CAPTION_FAILURE_MARKER, detail))
    }

    pub fn is_failure(&self) -> bool {
        self.description.starts_with(CAPTION_FAILURE_MARKER)
    }
}

/// Turns free-form model output into a caption.
///
/// Models are asked for `{"description": ..., "zh": ...}` but often wrap it
/// in a fenced code block or surround it with prose, and sometimes answer in
/// plain text. The outermost `{...}` is decoded when possible; anything that
/// is not an object with a string `description` falls back to the raw text.
pub fn parse_model_response(text: &str) -> CaptionResult {
    let raw = text.trim();
    let candidate = strip_code_fence(raw);

    if let (Some(start), Some(end)) = (candidate.find('{'), candidate.rfind('}')) {
        if start < end {
            if let Some(result) = decode_caption(&candidate[start..=end]) {
                return result;
            }
        }
    }

    if let Some(result) = decode_caption(candidate) {
        return result;
    }

    CaptionResult::new(raw)
}

fn decode_caption(text: &str) -> Option<CaptionResult> {
    let value: Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;
    let description = object.get("description")?.as_str()?;
    let zh = object.get("zh").and_then(|v| v.as_str()).unwrap_or_default();

    Some(CaptionResult {
        description: description.to_string(),
        zh: zh.to_string(),
    })
}

/// Content of a leading ```` ``` ```` block (language tag removed), or the
/// input unchanged when there is none.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(end) = rest.find("```") else {
        return text;
    };

    let block = &rest[..end];
    let block = block.strip_prefix("json").unwrap_or(block);
    block.trim()
}
