use crate::traits::{ImageCaptionInput, ImageCaptionOutput};
use anyhow::anyhow;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::blip::VisionConfig;
use candle_transformers::models::{blip, blip_text};
use label_config::{DeviceKind, LocalModelConfig, Precision, LOCAL_CAPTION_TEMPLATE};
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{debug, info};

pub const MODEL_FILE: &str = "model.safetensors";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

const BOS_TOKEN_ID: u32 = 30522;
const SEP_TOKEN_ID: u32 = 102;
const MAX_POSITIONS: usize = 512;
const IMAGE_SIZE: usize = 384;

pub struct BLIP {
    tokenizer: Tokenizer,
    model: blip::BlipForConditionalGeneration,
    device: Device,
    dtype: DType,
}

fn blip_base_config() -> blip::Config {
    let text_config = blip_text::Config {
        vocab_size: 30524,
        hidden_size: 768,
        encoder_hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 768,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        max_position_embeddings: 512,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-12,
        is_decoder: true,
    };
    let vision_config = VisionConfig {
        hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 512,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        image_size: 384,
        patch_size: 16,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-5,
    };

    blip::Config {
        text_config,
        vision_config,
        projection_dim: 512,
        image_text_hidden_size: 256,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BLIPModel {
    Base,
    Large,
}

impl BLIPModel {
    pub fn from_model_id(model_id: &str) -> Self {
        if model_id.to_lowercase().contains("base") {
            Self::Base
        } else {
            Self::Large
        }
    }

    fn config(self) -> blip::Config {
        match self {
            Self::Base => blip_base_config(),
            Self::Large => blip::Config::image_captioning_large(),
        }
    }
}

/// Decoding settings taken from the local model config.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub do_sample: bool,
    pub temperature: f64,
    pub top_p: f64,
    pub num_beams: usize,
    pub seed: u64,
}

impl From<&LocalModelConfig> for GenerationParams {
    fn from(config: &LocalModelConfig) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            do_sample: config.do_sample,
            temperature: config.temperature,
            top_p: config.top_p,
            num_beams: config.num_beams,
            seed: 1337,
        }
    }
}

impl GenerationParams {
    fn logits_processor(&self) -> LogitsProcessor {
        if self.do_sample && self.temperature > 0.0 {
            LogitsProcessor::new(self.seed, Some(self.temperature), Some(self.top_p))
        } else {
            LogitsProcessor::new(self.seed, None, None)
        }
    }
}

pub fn select_device(kind: DeviceKind) -> anyhow::Result<Device> {
    let device = match kind {
        DeviceKind::Cpu => Device::Cpu,
        DeviceKind::Cuda => Device::new_cuda(0)?,
        DeviceKind::Metal => Device::new_metal(0)?,
        DeviceKind::Auto => {
            if candle_core::utils::cuda_is_available() {
                Device::new_cuda(0)?
            } else if candle_core::utils::metal_is_available() {
                Device::new_metal(0)?
            } else {
                info!("no GPU available, falling back to CPU, captioning will be slow");
                Device::Cpu
            }
        }
    };

    Ok(device)
}

/// Half precision on CUDA, full precision elsewhere unless configured.
pub fn select_dtype(precision: Precision, device: &Device) -> DType {
    match precision {
        Precision::F32 => DType::F32,
        Precision::F16 => DType::F16,
        Precision::Bf16 => DType::BF16,
        Precision::Auto => {
            if device.is_cuda() {
                DType::F16
            } else {
                DType::F32
            }
        }
    }
}

/// The text the caption continues from, if the prompt is not a task template.
pub fn conditional_prefix(prompt: &str) -> Option<&str> {
    let prompt = prompt.trim();
    if prompt.is_empty() || prompt == LOCAL_CAPTION_TEMPLATE {
        return None;
    }
    if prompt.starts_with('<') && prompt.ends_with('>') {
        // other task templates (<DETAILED_CAPTION> etc.) have no BLIP counterpart
        return None;
    }
    Some(prompt)
}

impl BLIP {
    pub fn load(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        model_type: BLIPModel,
        device: Device,
        dtype: DType,
    ) -> anyhow::Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("failed to initialize tokenizer: {}", e))?;

        let config = model_type.config();

        debug!("loading BLIP weights on {:?} as {:?}", device, dtype);
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_path.as_ref()], dtype, &device)?
        };
        let model = blip::BlipForConditionalGeneration::new(&config, vb)?;

        Ok(Self {
            tokenizer,
            model,
            device,
            dtype,
        })
    }

    pub fn get_caption(
        &mut self,
        input: &ImageCaptionInput,
        params: &GenerationParams,
    ) -> anyhow::Result<ImageCaptionOutput> {
        debug!(
            "generating caption for image: {}",
            input.image_file_path.display()
        );
        if params.num_beams > 1 {
            debug!(
                "num_beams={} requested, beam search is not available, decoding token by token",
                params.num_beams
            );
        }

        let image = load_image(&input.image_file_path)?
            .to_device(&self.device)?
            .to_dtype(self.dtype)?;
        let image_embeds = image.unsqueeze(0)?.apply(self.model.vision_model())?;

        let mut token_ids = vec![BOS_TOKEN_ID];
        if let Some(prefix) = input.prompt.as_deref().and_then(conditional_prefix) {
            let encoding = self
                .tokenizer
                .encode(prefix, false)
                .map_err(|e| anyhow!("failed to tokenize prompt: {}", e))?;
            token_ids.extend_from_slice(encoding.get_ids());
        }

        let budget = params
            .max_new_tokens
            .min(MAX_POSITIONS.saturating_sub(token_ids.len()));
        let mut logits_processor = params.logits_processor();

        // we need this to make multi time generation work
        self.model.text_decoder().reset_kv_cache();

        for index in 0..budget {
            let context_size = if index > 0 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = self
                .model
                .text_decoder()
                .forward(&input_ids, &image_embeds)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?.to_dtype(DType::F32)?;
            let token = logits_processor.sample(&logits)?;
            if token == SEP_TOKEN_ID {
                break;
            }
            token_ids.push(token);
        }

        let result = self.tokenizer.decode(&token_ids, true);

        result
            .map(|v| v.trim().to_string())
            .map_err(|e| anyhow!("failed to generate caption: {}", e))
    }
}

/// Loads an image as a normalised (3, 384, 384) tensor.
pub fn load_image<P: AsRef<Path>>(p: P) -> candle_core::Result<Tensor> {
    let img = image::open(p)
        .map_err(candle_core::Error::wrap)?
        .resize_to_fill(
            IMAGE_SIZE as u32,
            IMAGE_SIZE as u32,
            image::imageops::FilterType::Triangle,
        );
    let img = img.to_rgb8();
    let data = img.into_raw();
    let data = Tensor::from_vec(data, (IMAGE_SIZE, IMAGE_SIZE, 3), &Device::Cpu)?.permute((2, 0, 1))?;
    let mean = Tensor::new(&[0.48145466f32, 0.4578275, 0.40821073], &Device::Cpu)?
        .reshape((3, 1, 1))?;
    let std = Tensor::new(&[0.26862954f32, 0.261_302_6, 0.275_777_1], &Device::Cpu)?
        .reshape((3, 1, 1))?;
    (data.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)
}
