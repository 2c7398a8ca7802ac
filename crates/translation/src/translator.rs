use async_trait::async_trait;
use std::{future::Future, time::Duration};
use tracing::warn;

/// Prefix of every text produced by a failed translation.
pub const TRANSLATION_FAILURE_MARKER: &str = "[translation failed]";

pub fn is_translation_failure(text: &str) -> bool {
    text.starts_with(TRANSLATION_FAILURE_MARKER)
}

pub fn translation_failure(detail: impl std::fmt::Display) -> String {
    format!("{} {}", TRANSLATION_FAILURE_MARKER, detail)
}

/// Translates text between two language codes (`en`, `zh`, ...).
///
/// Never fails: errors come back as text starting with
/// [`TRANSLATION_FAILURE_MARKER`]. Empty input gives empty output without
/// touching the network.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str) -> String;
}

/// Runs `request` unless `text` is blank, turning its error into failure
/// text.
pub(crate) async fn guarded<F, Fut>(text: &str, request: F) -> String
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<String>>,
{
    if text.trim().is_empty() {
        return String::new();
    }

    match request().await {
        Ok(v) => v,
        Err(e) => {
            warn!("translation failed: {}", e);
            translation_failure(e)
        }
    }
}

/// Waits before a network call so consecutive requests stay under the
/// services' rate limits.
pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

pub(crate) fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "zh" | "zh-CN" => "Simplified Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        _ => code,
    }
}
