use crate::defaults::{
    default_models_dir, DEFAULT_PROMPT, GEMINI_BASE_URL, GEMINI_MODELS, GLM_LABEL_MODELS,
    GLM_TRANSLATE_MODELS, HF_ENDPOINT, LOCAL_CAPTION_TEMPLATE, LOCAL_MODELS, ZHIPU_BASE_URL,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// A typed sub-mapping of the config document.
///
/// Saved values are merged over `Default::default()` key by key, so a section
/// that gains a field keeps working with documents written before it existed.
pub trait ConfigSection: Serialize + DeserializeOwned + Default {
    const KEY: &'static str;
}

/// The closed set of caption backends.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LabelerKind {
    Gemini,
    Zhipu,
    #[default]
    Local,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TranslatorKind {
    #[default]
    Google,
    Zhipu,
    #[serde(rename = "mymemory")]
    #[strum(serialize = "mymemory")]
    MyMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Precision {
    #[default]
    Auto,
    F32,
    F16,
    Bf16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub prompt: String,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: GEMINI_MODELS[0].into(),
            temperature: 0.8,
            max_output_tokens: 2048,
            prompt: DEFAULT_PROMPT.into(),
            base_url: GEMINI_BASE_URL.into(),
        }
    }
}

impl ConfigSection for GeminiConfig {
    const KEY: &'static str = "gemini_config";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZhipuLabelConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub base_url: String,
}

impl Default for ZhipuLabelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: GLM_LABEL_MODELS[0].into(),
            temperature: 0.7,
            max_tokens: 2048,
            base_url: ZHIPU_BASE_URL.into(),
        }
    }
}

impl ConfigSection for ZhipuLabelConfig {
    const KEY: &'static str = "zhipu_label_config";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZhipuTranslateConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub base_url: String,
}

impl Default for ZhipuTranslateConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: GLM_TRANSLATE_MODELS[0].into(),
            temperature: 0.7,
            max_tokens: 2048,
            base_url: ZHIPU_BASE_URL.into(),
        }
    }
}

impl ConfigSection for ZhipuTranslateConfig {
    const KEY: &'static str = "zhipu_translate_config";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalModelConfig {
    /// Hugging Face repository id, also the cache key for loaded weights.
    pub model: String,
    /// `<CAPTION>` for an unconditional caption, otherwise a text prefix the
    /// caption continues from.
    pub prompt: String,
    pub device: DeviceKind,
    pub precision: Precision,
    pub max_new_tokens: usize,
    pub do_sample: bool,
    pub temperature: f64,
    pub num_beams: usize,
    pub top_p: f64,
    pub models_dir: PathBuf,
    pub hf_endpoint: String,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            model: LOCAL_MODELS[0].into(),
            prompt: LOCAL_CAPTION_TEMPLATE.into(),
            device: DeviceKind::Auto,
            precision: Precision::Auto,
            max_new_tokens: 1024,
            do_sample: true,
            temperature: 0.6,
            num_beams: 4,
            top_p: 0.9,
            models_dir: default_models_dir(),
            hf_endpoint: HF_ENDPOINT.into(),
        }
    }
}

impl ConfigSection for LocalModelConfig {
    const KEY: &'static str = "local_config";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub backend: TranslatorKind,
    pub timeout_secs: u64,
    /// Pause before every outgoing translation request.
    pub request_delay_ms: u64,
    /// Longest text sent in one request by backends with an input ceiling.
    pub chunk_limit: usize,
    pub mymemory_email: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            backend: TranslatorKind::Google,
            timeout_secs: 5,
            request_delay_ms: 500,
            chunk_limit: 500,
            mymemory_email: String::new(),
        }
    }
}

impl ConfigSection for TranslationConfig {
    const KEY: &'static str = "translation_config";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelingConfig {
    pub backend: LabelerKind,
    /// Batch captioning re-captions rows that already have text.
    pub overwrite_existing: bool,
    /// Translate a fresh caption right away when the backend gave no `zh`.
    pub auto_translate: bool,
    pub batch_delay_ms: u64,
    pub translate_batch_delay_ms: u64,
    pub max_image_dimension: u32,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            backend: LabelerKind::Local,
            overwrite_existing: false,
            auto_translate: false,
            batch_delay_ms: 1000,
            translate_batch_delay_ms: 100,
            max_image_dimension: 2048,
        }
    }
}

impl ConfigSection for LabelingConfig {
    const KEY: &'static str = "labeling_config";
}

/// Keys of every typed section, in the order they are seeded.
pub const SECTION_KEYS: [&str; 6] = [
    GeminiConfig::KEY,
    ZhipuLabelConfig::KEY,
    ZhipuTranslateConfig::KEY,
    LocalModelConfig::KEY,
    TranslationConfig::KEY,
    LabelingConfig::KEY,
];

/// Model ids offered for the `model` key of a section, empty for sections
/// without one.
pub fn known_models(section: &str) -> &'static [&'static str] {
    match section {
        GeminiConfig::KEY => &GEMINI_MODELS,
        ZhipuLabelConfig::KEY => &GLM_LABEL_MODELS,
        ZhipuTranslateConfig::KEY => &GLM_TRANSLATE_MODELS,
        LocalModelConfig::KEY => &LOCAL_MODELS,
        _ => &[],
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_models_are_known() {
        assert!(known_models(GeminiConfig::KEY).contains(&GeminiConfig::default().model.as_str()));
        assert!(known_models(LocalModelConfig::KEY)
            .contains(&LocalModelConfig::default().model.as_str()));
        assert!(known_models(LabelingConfig::KEY).is_empty());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(LabelerKind::from_str("zhipu").unwrap(), LabelerKind::Zhipu);
        assert_eq!(TranslatorKind::MyMemory.to_string(), "mymemory");
        assert_eq!(
            serde_json::to_value(TranslatorKind::MyMemory).unwrap(),
            serde_json::json!("mymemory")
        );
        assert!(LabelerKind::from_str("florence").is_err());
    }
}
