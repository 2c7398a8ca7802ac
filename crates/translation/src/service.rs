use crate::{
    google::GoogleTranslator,
    mymemory::MyMemoryTranslator,
    translator::{translation_failure, Translator},
    zhipu::ZhipuTranslator,
};
use async_trait::async_trait;
use label_config::{ConfigStore, TranslatorKind};
use std::{sync::Arc, time::Duration};
use tracing::warn;

/// The active translation strategy, built from the config at call time.
pub enum TranslationBackend {
    Google(GoogleTranslator),
    Zhipu(ZhipuTranslator),
    MyMemory(MyMemoryTranslator),
}

impl TranslationBackend {
    pub fn from_config(store: &ConfigStore) -> anyhow::Result<Self> {
        Self::build(store, store.translation_config().backend)
    }

    pub fn build(store: &ConfigStore, kind: TranslatorKind) -> anyhow::Result<Self> {
        let config = store.translation_config();
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let delay = Duration::from_millis(config.request_delay_ms);

        let backend = match kind {
            TranslatorKind::Google => Self::Google(GoogleTranslator::new(timeout, delay)?),
            TranslatorKind::Zhipu => {
                Self::Zhipu(ZhipuTranslator::new(store.zhipu_translate_config(), delay))
            }
            TranslatorKind::MyMemory => Self::MyMemory(MyMemoryTranslator::new(
                timeout,
                delay,
                config.chunk_limit,
                Some(config.mymemory_email),
            )?),
        };

        Ok(backend)
    }

    pub fn kind(&self) -> TranslatorKind {
        match self {
            Self::Google(_) => TranslatorKind::Google,
            Self::Zhipu(_) => TranslatorKind::Zhipu,
            Self::MyMemory(_) => TranslatorKind::MyMemory,
        }
    }
}

#[async_trait]
impl Translator for TranslationBackend {
    async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        match self {
            Self::Google(v) => v.translate(text, source, target).await,
            Self::Zhipu(v) => v.translate(text, source, target).await,
            Self::MyMemory(v) => v.translate(text, source, target).await,
        }
    }
}

/// Translator that follows `translation_config.backend`, so switching
/// backends takes effect on the next call.
pub struct ConfiguredTranslator {
    config: Arc<ConfigStore>,
}

impl ConfiguredTranslator {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Translator for ConfiguredTranslator {
    #[tracing::instrument(skip(self, text))]
    async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        match TranslationBackend::from_config(&self.config) {
            Ok(backend) => backend.translate(text, source, target).await,
            Err(e) => {
                warn!("failed to build translator: {}", e);
                translation_failure(e)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use label_config::TranslationConfig;
    use strum::IntoEnumIterator;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("data.json"));
        store
            .set_translation_config(&TranslationConfig {
                request_delay_ms: 60_000,
                ..Default::default()
            })
            .unwrap();
        (dir, store)
    }

    #[test_log::test(tokio::test)]
    async fn test_empty_input_for_every_backend() {
        let (_dir, store) = store();
        for kind in TranslatorKind::iter() {
            let backend = TranslationBackend::build(&store, kind).unwrap();
            assert_eq!(backend.kind(), kind);
            assert_eq!(backend.translate("", "en", "zh").await, "");
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_configured_translator_follows_config() {
        let (_dir, store) = store();
        let mut config = store.translation_config();
        config.backend = TranslatorKind::Zhipu;
        config.request_delay_ms = 0;
        store.set_translation_config(&config).unwrap();

        let translator = ConfiguredTranslator::new(Arc::new(store));
        assert_eq!(translator.translate("", "en", "zh").await, "");

        // zhipu without a key fails before any request
        let result = translator.translate("a cat", "en", "zh").await;
        assert!(crate::is_translation_failure(&result));
    }
}
