//! Compiled-in defaults shared by every config section.

/// Caption instruction used for new directories and by the cloud labelers
/// when no directory override is set.
pub const DEFAULT_PROMPT: &str = r#"Describe this image in detail for AI image generation. Focus on visual elements, style, composition, and important details.

Use this JSON schema:
{
  "description": "A detailed description of the image.",
  "zh": "图像的详细描述。"
}

Your response should focus on:
1. The main subject and actions
2. Scene and atmosphere
3. Artistic style
4. Clothing and appearance
5. Composition and perspective
6. Lighting and colors
7. Details and textures

Return only the JSON object with these two fields."#;

pub const GEMINI_MODELS: [&str; 4] = [
    "gemini-2.0-flash-exp",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
    "gemini-1.5-pro",
];

pub const GLM_LABEL_MODELS: [&str; 3] = ["glm-4v-flash", "glm-4v-plus-0111", "glm-4v-plus"];

pub const GLM_TRANSLATE_MODELS: [&str; 3] = ["glm-4-flash-250414", "glm-4-flash", "glm-4-plus"];

pub const LOCAL_MODELS: [&str; 2] = [
    "Salesforce/blip-image-captioning-large",
    "Salesforce/blip-image-captioning-base",
];

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const ZHIPU_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4/";
pub const HF_ENDPOINT: &str = "https://huggingface.co";

/// Prompt template that asks the local model for an unconditional caption.
pub const LOCAL_CAPTION_TEMPLATE: &str = "<CAPTION>";

pub(crate) const APP_DIR_NAME: &str = "image-labeler";

pub(crate) fn default_models_dir() -> std::path::PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("models")
}
