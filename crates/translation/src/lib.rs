mod chunk;
mod google;
mod mymemory;
mod service;
mod translator;
mod zhipu;

pub use chunk::{split_into_chunks, split_sentences};
pub use google::GoogleTranslator;
pub use mymemory::MyMemoryTranslator;
pub use service::{ConfiguredTranslator, TranslationBackend};
pub use translator::{
    is_translation_failure, translation_failure, Translator, TRANSLATION_FAILURE_MARKER,
};
pub use zhipu::ZhipuTranslator;
