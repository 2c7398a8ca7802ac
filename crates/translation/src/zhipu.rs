use crate::translator::{guarded, language_name, pause, Translator};
use ai::llm::{openai::OpenAI, LLMInferenceParams, LLMMessage, LLMUserMessage};
use anyhow::bail;
use async_trait::async_trait;
use label_config::ZhipuTranslateConfig;
use std::time::Duration;

/// Translation through the Zhipu GLM chat model.
pub struct ZhipuTranslator {
    config: ZhipuTranslateConfig,
    delay: Duration,
}

impl ZhipuTranslator {
    pub fn new(config: ZhipuTranslateConfig, delay: Duration) -> Self {
        Self { config, delay }
    }

    async fn request(&self, text: &str, source: &str, target: &str) -> anyhow::Result<String> {
        if self.config.api_key.trim().is_empty() {
            bail!("Zhipu API key is not configured");
        }

        let client = OpenAI::new(
            &self.config.base_url,
            self.config.api_key.trim(),
            &self.config.model,
        )?;

        pause(self.delay).await;

        let messages = vec![
            LLMMessage::System(system_prompt(source, target)),
            LLMMessage::User(vec![LLMUserMessage::Text(text.to_string())]),
        ];
        client
            .get_completion(
                &messages,
                LLMInferenceParams {
                    temperature: self.config.temperature,
                    top_p: None,
                    max_tokens: Some(self.config.max_tokens),
                },
            )
            .await
    }
}

#[async_trait]
impl Translator for ZhipuTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        guarded(text, || self.request(text, source, target)).await
    }
}

fn system_prompt(source: &str, target: &str) -> String {
    format!(
        "You are a professional translator. Translate the user's text from {} to {}. \
         Keep line breaks. Reply with the translation only, without notes or quotes.",
        language_name(source),
        language_name(target)
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::is_translation_failure;

    #[tokio::test]
    async fn test_missing_key_is_failure() {
        let translator = ZhipuTranslator::new(ZhipuTranslateConfig::default(), Duration::ZERO);
        let result = translator.translate("a cat", "en", "zh").await;
        assert!(is_translation_failure(&result));
        assert!(result.contains("API key"));
    }

    #[tokio::test]
    async fn test_empty_input_is_empty() {
        let translator = ZhipuTranslator::new(ZhipuTranslateConfig::default(), Duration::ZERO);
        assert_eq!(translator.translate("", "en", "zh").await, "");
    }

    #[test]
    fn test_prompt_names_languages() {
        let prompt = system_prompt("en", "zh");
        assert!(prompt.contains("from English to Simplified Chinese"));
    }
}
