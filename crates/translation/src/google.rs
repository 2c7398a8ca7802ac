use crate::translator::{guarded, pause, Translator};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use serde_json::Value;
use std::time::Duration;

const GOOGLE_TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Keyless Google translate endpoint. Unofficial, so it may throttle or
/// change shape without notice.
pub struct GoogleTranslator {
    client: reqwest::Client,
    delay: Duration,
}

impl GoogleTranslator {
    pub fn new(timeout: Duration, delay: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, delay })
    }

    async fn request(&self, text: &str, source: &str, target: &str) -> anyhow::Result<String> {
        pause(self.delay).await;

        let response = self
            .client
            .get(GOOGLE_TRANSLATE_URL)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            bail!("google translate returned {}", status);
        }

        let body: Value = response.json().await?;
        parse_google_response(&body)
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        guarded(text, || self.request(text, source, target)).await
    }
}

/// The response is a nested array whose first element lists
/// `[translated, original, ...]` segments.
pub(crate) fn parse_google_response(body: &Value) -> anyhow::Result<String> {
    let segments = body
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or(anyhow!("unexpected google translate response"))?;

    let text = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(|v| v.as_str()))
        .collect::<String>();

    Ok(text)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segments_are_concatenated() {
        let body = json!([
            [["一只猫。", "A cat.", null, null, 10], ["在沙发上。", " On a sofa.", null, null, 10]],
            null,
            "en"
        ]);
        assert_eq!(parse_google_response(&body).unwrap(), "一只猫。在沙发上。");
    }

    #[test]
    fn test_unexpected_shape_is_error() {
        assert!(parse_google_response(&json!({"error": "x"})).is_err());
    }

    #[tokio::test]
    async fn test_empty_input_is_empty() {
        let translator =
            GoogleTranslator::new(Duration::from_millis(1), Duration::from_secs(60)).unwrap();
        assert_eq!(translator.translate("", "en", "zh").await, "");
    }
}
