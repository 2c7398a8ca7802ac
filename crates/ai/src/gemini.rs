use anyhow::{anyhow, bail};
use reqwest::{
    header::{HeaderMap, CONTENT_TYPE},
    Url,
};
use serde::Deserialize;
use serde_json::json;

/// Minimal client for the Gemini `generateContent` REST method.
pub struct Gemini {
    base_url: String,
    model: String,
    headers: HeaderMap,
    client: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct GeminiGenerationParams {
    pub temperature: f64,
    pub max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<serde_json::Value>,
}

impl GeminiResponse {
    fn into_text(self) -> anyhow::Result<String> {
        let feedback = self.prompt_feedback;
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no candidate in response, prompt feedback: {:?}", feedback))?;

        if let Some(finish_reason) = &candidate.finish_reason {
            tracing::debug!("gemini finish reason: {}", finish_reason);
        }

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            bail!("empty text in response");
        }

        Ok(text.trim().to_string())
    }
}

impl Gemini {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> anyhow::Result<Self> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", api_key.parse()?);
        headers.insert(CONTENT_TYPE, "application/json".parse()?);

        Ok(Self {
            base_url,
            model: model.to_string(),
            headers,
            client: reqwest::Client::new(),
        })
    }

    /// Sends `prompt` together with a base64 encoded JPEG and returns the
    /// concatenated text of the first candidate.
    pub async fn generate_with_image(
        &self,
        prompt: &str,
        image_base64: &str,
        params: &GeminiGenerationParams,
    ) -> anyhow::Result<String> {
        let url = Url::parse(&self.base_url)?
            .join(&format!("models/{}:generateContent", self.model))?;

        tracing::debug!("gemini url: {}", url);

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": prompt},
                    {"inline_data": {"mime_type": "image/jpeg", "data": image_base64}}
                ]
            }],
            "generationConfig": {
                "temperature": params.temperature,
                "maxOutputTokens": params.max_output_tokens
            }
        });

        let response = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("gemini request failed with {}: {}", status, body);
        }

        let response: GeminiResponse = response.json().await?;
        response.into_text()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_response_text_is_joined() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"description\": "}, {"text": "\"a cat\"}"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        assert_eq!(response.into_text().unwrap(), "{\"description\": \"a cat\"}");
    }

    #[test]
    fn test_blocked_response_is_error() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();

        let err = response.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
