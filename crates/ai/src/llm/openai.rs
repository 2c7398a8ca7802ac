use super::{LLMInferenceParams, LLMMessage, LLMUserMessage};
use anyhow::{anyhow, bail};
use reqwest::{
    self,
    header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE},
    Url,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Chat completion client for OpenAI compatible endpoints (Zhipu BigModel
/// speaks the same protocol).
pub struct OpenAI {
    base_url: String,
    model: String,
    headers: HeaderMap,
    client: reqwest::Client,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIResponseMessage {
    role: Option<String>,
    content: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIResponseChoice {
    index: Option<usize>,
    message: Option<OpenAIResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIResponse {
    id: Option<String>,
    model: Option<String>,
    choices: Vec<OpenAIResponseChoice>,
}

fn message_to_json(message: &LLMMessage) -> Value {
    let (role, content) = match message {
        LLMMessage::System(v) => ("system", json!(v)),
        LLMMessage::User(v) => (
            "user",
            if let [LLMUserMessage::Text(text)] = v.as_slice() {
                json!(text)
            } else {
                Value::Array(
                    v.iter()
                        .map(|t| match t {
                            LLMUserMessage::ImageUrl(image_url) => {
                                json!({"type": "image_url", "image_url": {"url": image_url}})
                            }
                            LLMUserMessage::Text(text) => {
                                json!({"type": "text", "text": text})
                            }
                        })
                        .collect(),
                )
            },
        ),
        LLMMessage::Assistant(v) => ("assistant", json!(v)),
    };

    json!({
        "role": role,
        "content": content
    })
}

impl OpenAI {
    /// Create a new OpenAI compatible chat completion client.
    pub fn new(base_url: &str, api_key: &str, model: &str) -> anyhow::Result<Self> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {}", api_key).parse()?);
        headers.insert(CONTENT_TYPE, "application/json".parse()?);

        Ok(Self {
            base_url,
            model: model.to_string(),
            headers,
            client: reqwest::Client::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn get_completion(
        &self,
        history: &[LLMMessage],
        params: LLMInferenceParams,
    ) -> anyhow::Result<String> {
        let url = Url::parse(&self.base_url)?;
        let query = url.query();
        let mut url = url.join("chat/completions")?;
        url.set_query(query);

        tracing::debug!("openai url: {:?}", url);

        let messages = history.iter().map(message_to_json).collect::<Vec<Value>>();

        let response = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .body(
                json!({
                    "model": &self.model,
                    "messages": messages,
                    "stream": false,
                    "temperature": params.temperature,
                    "top_p": params.top_p,
                    "max_tokens": params.max_tokens
                })
                .to_string(),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("chat completion failed with {}: {}", status, body);
        }

        let response: OpenAIResponse = response.json().await?;
        tracing::debug!(
            "chat completion {:?} from {:?}",
            response.id,
            response.model
        );

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(anyhow!("no choice in chat completion response"))?;

        if let Some(finish_reason) = &choice.finish_reason {
            tracing::debug!("LLM finish reason: {:?}", finish_reason);
        }

        choice
            .message
            .and_then(|v| v.content)
            .map(|v| v.trim().to_string())
            .ok_or(anyhow!("no content in chat completion response"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_single_text_message_is_plain_string() {
        let value = message_to_json(&LLMMessage::User(vec![LLMUserMessage::Text(
            "hello".into(),
        )]));
        assert_eq!(value, json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn test_image_message_is_content_array() {
        let value = message_to_json(&LLMMessage::User(vec![
            LLMUserMessage::Text("describe".into()),
            LLMUserMessage::ImageUrl("data:image/jpeg;base64,AAAA".into()),
        ]));
        assert_eq!(
            value["content"],
            json!([
                {"type": "text", "text": "describe"},
                {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAAA"}}
            ])
        );
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = OpenAI::new("https://open.bigmodel.cn/api/paas/v4", "key", "glm-4v-flash")
            .unwrap();
        assert_eq!(client.base_url, "https://open.bigmodel.cn/api/paas/v4/");
        assert_eq!(client.model(), "glm-4v-flash");
    }
}
