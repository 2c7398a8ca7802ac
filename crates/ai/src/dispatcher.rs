use crate::{
    blip::{self, BLIPModel, GenerationParams, BLIP},
    caption::{parse_model_response, CaptionResult},
    gemini::{Gemini, GeminiGenerationParams},
    llm::{openai::OpenAI, LLMInferenceParams, LLMMessage, LLMUserMessage},
    loader::ModelLoader,
    traits::{ImageCaptionInput, Labeler},
    utils::{encode_image_for_upload, jpeg_data_url},
};
use async_trait::async_trait;
use file_downloader::{FileDownload, FileDownloadConfig};
use label_config::{
    ConfigStore, GeminiConfig, LabelerKind, LocalModelConfig, ZhipuLabelConfig, DEFAULT_PROMPT,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("{0} API key is not configured")]
    MissingApiKey(&'static str),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// One captioning strategy, built from its own config section for a single
/// call.
pub enum CaptionBackend {
    Gemini(GeminiCaptioner),
    Zhipu(ZhipuCaptioner),
    Local(LocalCaptioner),
}

pub struct GeminiCaptioner {
    config: GeminiConfig,
    max_image_dimension: u32,
}

pub struct ZhipuCaptioner {
    config: ZhipuLabelConfig,
    max_image_dimension: u32,
}

pub struct LocalCaptioner {
    config: LocalModelConfig,
    loader: Arc<ModelLoader<BLIP>>,
}

/// Routes captioning requests to the selected backend.
///
/// Configuration is read at the moment of each call. The only state kept
/// between calls is the loaded local model.
pub struct CaptionDispatcher {
    config: Arc<ConfigStore>,
    local: Arc<ModelLoader<BLIP>>,
}

impl CaptionDispatcher {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            local: Arc::new(ModelLoader::new()),
        }
    }

    /// Whether `model_id` is already in memory, so the next local call will
    /// not pay the load cost.
    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.local.loaded_model_id().as_deref() == Some(model_id)
    }

    pub fn is_local_model_loaded(&self) -> bool {
        self.is_loaded(&self.config.local_config().model)
    }

    pub fn unload_local_model(&self) {
        self.local.offload();
    }

    pub fn backend(&self, kind: LabelerKind) -> CaptionBackend {
        let max_image_dimension = self.config.labeling_config().max_image_dimension;
        match kind {
            LabelerKind::Gemini => CaptionBackend::Gemini(GeminiCaptioner {
                config: self.config.gemini_config(),
                max_image_dimension,
            }),
            LabelerKind::Zhipu => CaptionBackend::Zhipu(ZhipuCaptioner {
                config: self.config.zhipu_label_config(),
                max_image_dimension,
            }),
            LabelerKind::Local => CaptionBackend::Local(LocalCaptioner {
                config: self.config.local_config(),
                loader: self.local.clone(),
            }),
        }
    }

    #[tracing::instrument(skip(self, directory_prompt), fields(image = %image_path.display()))]
    pub async fn label(
        &self,
        image_path: &Path,
        backend: LabelerKind,
        directory_prompt: Option<&str>,
    ) -> CaptionResult {
        let start = std::time::Instant::now();
        let result = self.backend(backend).caption(image_path, directory_prompt).await;

        match result {
            Ok(result) => {
                info!("caption done in {:?}", start.elapsed());
                result
            }
            Err(e) => {
                warn!("caption failed: {}", e);
                CaptionResult::failure(e)
            }
        }
    }
}

#[async_trait]
impl Labeler for CaptionDispatcher {
    async fn label(
        &self,
        image_path: &Path,
        backend: LabelerKind,
        directory_prompt: Option<&str>,
    ) -> CaptionResult {
        CaptionDispatcher::label(self, image_path, backend, directory_prompt).await
    }
}

impl CaptionBackend {
    pub fn kind(&self) -> LabelerKind {
        match self {
            Self::Gemini(_) => LabelerKind::Gemini,
            Self::Zhipu(_) => LabelerKind::Zhipu,
            Self::Local(_) => LabelerKind::Local,
        }
    }

    pub async fn caption(
        &self,
        image_path: &Path,
        directory_prompt: Option<&str>,
    ) -> Result<CaptionResult, CaptionError> {
        match self {
            Self::Gemini(v) => v.caption(image_path, directory_prompt).await,
            Self::Zhipu(v) => v.caption(image_path, directory_prompt).await,
            Self::Local(v) => v.caption(image_path).await,
        }
    }
}

fn effective_prompt<'a>(directory_prompt: Option<&'a str>, default: &'a str) -> &'a str {
    match directory_prompt {
        Some(prompt) if !prompt.trim().is_empty() => prompt,
        _ => default,
    }
}

async fn encode_image(image_path: &Path, max_dimension: u32) -> anyhow::Result<String> {
    let image_path = image_path.to_path_buf();
    tokio::task::spawn_blocking(move || encode_image_for_upload(&image_path, max_dimension))
        .await?
}

impl GeminiCaptioner {
    async fn caption(
        &self,
        image_path: &Path,
        directory_prompt: Option<&str>,
    ) -> Result<CaptionResult, CaptionError> {
        if self.config.api_key.trim().is_empty() {
            return Err(CaptionError::MissingApiKey("Gemini"));
        }

        let prompt = effective_prompt(directory_prompt, &self.config.prompt);
        let image = encode_image(image_path, self.max_image_dimension).await?;

        let client = Gemini::new(
            &self.config.base_url,
            self.config.api_key.trim(),
            &self.config.model,
        )?;
        let text = client
            .generate_with_image(
                prompt,
                &image,
                &GeminiGenerationParams {
                    temperature: self.config.temperature,
                    max_output_tokens: self.config.max_output_tokens,
                },
            )
            .await?;

        debug!("gemini raw response: {}", text);
        Ok(parse_model_response(&text))
    }
}

impl ZhipuCaptioner {
    async fn caption(
        &self,
        image_path: &Path,
        directory_prompt: Option<&str>,
    ) -> Result<CaptionResult, CaptionError> {
        if self.config.api_key.trim().is_empty() {
            return Err(CaptionError::MissingApiKey("Zhipu"));
        }

        let prompt = effective_prompt(directory_prompt, DEFAULT_PROMPT);
        let image = encode_image(image_path, self.max_image_dimension).await?;

        let client = OpenAI::new(
            &self.config.base_url,
            self.config.api_key.trim(),
            &self.config.model,
        )?;
        let messages = vec![LLMMessage::User(vec![
            LLMUserMessage::Text(prompt.to_string()),
            LLMUserMessage::ImageUrl(jpeg_data_url(&image)),
        ])];
        let text = client
            .get_completion(
                &messages,
                LLMInferenceParams {
                    temperature: self.config.temperature,
                    top_p: None,
                    max_tokens: Some(self.config.max_tokens),
                },
            )
            .await?;

        debug!("zhipu raw response: {}", text);
        Ok(parse_model_response(&text))
    }
}

impl LocalCaptioner {
    fn downloader(&self) -> FileDownload {
        FileDownload::new(FileDownloadConfig {
            endpoint: self.config.hf_endpoint.clone(),
            models_dir: self.config.models_dir.clone(),
            ..Default::default()
        })
    }

    async fn model_files(&self) -> anyhow::Result<(PathBuf, PathBuf)> {
        let download = self.downloader();
        let model_path = download
            .download_if_not_exists(&self.config.model, blip::MODEL_FILE)
            .await?;
        let tokenizer_path = download
            .download_if_not_exists(&self.config.model, blip::TOKENIZER_FILE)
            .await?;
        Ok((model_path, tokenizer_path))
    }

    /// The local model always follows its own prompt template; directory
    /// instructions are written for chat models.
    async fn caption(&self, image_path: &Path) -> Result<CaptionResult, CaptionError> {
        let model_id = self.config.model.clone();
        if self.loader.loaded_model_id().as_deref() != Some(model_id.as_str()) {
            info!("local model {} is not loaded, first call will be slow", model_id);
        }
        let (model_path, tokenizer_path) = self.model_files().await?;

        let input = ImageCaptionInput {
            image_file_path: image_path.to_path_buf(),
            prompt: Some(self.config.prompt.clone()),
        };
        let params = GenerationParams::from(&self.config);
        let device_kind = self.config.device;
        let precision = self.config.precision;
        let loader = self.loader.clone();

        let caption = tokio::task::spawn_blocking(move || {
            loader.with_model(
                &model_id,
                || {
                    let device = blip::select_device(device_kind)?;
                    let dtype = blip::select_dtype(precision, &device);
                    BLIP::load(
                        &model_path,
                        &tokenizer_path,
                        BLIPModel::from_model_id(&model_id),
                        device,
                        dtype,
                    )
                },
                |model| model.get_caption(&input, &params),
            )
        })
        .await
        .map_err(anyhow::Error::from)??;

        Ok(parse_model_response(&caption))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::CAPTION_FAILURE_MARKER;
    use label_config::{ConfigStore, GeminiConfig};
    use test_log::test;

    fn store_in(dir: &tempfile::TempDir) -> Arc<ConfigStore> {
        Arc::new(ConfigStore::open(dir.path().join("data.json")))
    }

    #[test(tokio::test)]
    async fn test_cloud_backends_without_key_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = CaptionDispatcher::new(store_in(&dir));

        // the image does not exist: the key check must come first
        let image = dir.path().join("missing.jpg");

        let result = dispatcher.label(&image, LabelerKind::Gemini, None).await;
        assert!(result.is_failure());
        assert!(result.description.starts_with(CAPTION_FAILURE_MARKER));
        assert!(result.description.contains("Gemini API key"));
        assert!(result.zh.is_empty());

        let result = dispatcher.label(&image, LabelerKind::Zhipu, None).await;
        assert!(result.is_failure());
        assert!(result.description.contains("Zhipu API key"));
    }

    #[test(tokio::test)]
    async fn test_unreadable_image_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .set_gemini_config(&GeminiConfig {
                api_key: "key".into(),
                ..Default::default()
            })
            .unwrap();
        let dispatcher = CaptionDispatcher::new(store);

        let image = dir.path().join("broken.jpg");
        std::fs::write(&image, b"not an image").unwrap();

        let result = dispatcher.label(&image, LabelerKind::Gemini, None).await;
        assert!(result.is_failure());
    }

    #[test]
    fn test_backend_follows_kind() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = CaptionDispatcher::new(store_in(&dir));
        for kind in [LabelerKind::Gemini, LabelerKind::Zhipu, LabelerKind::Local] {
            assert_eq!(dispatcher.backend(kind).kind(), kind);
        }
        assert!(!dispatcher.is_local_model_loaded());
    }

    #[test]
    fn test_effective_prompt() {
        assert_eq!(effective_prompt(Some("custom"), "default"), "custom");
        assert_eq!(effective_prompt(Some("  "), "default"), "default");
        assert_eq!(effective_prompt(None, "default"), "default");
    }
}
