use crate::{
    chunk::split_into_chunks,
    translator::{guarded, pause, Translator},
};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::{future::Future, time::Duration};
use tracing::debug;

const MYMEMORY_URL: &str = "https://api.mymemory.translated.net/get";

/// MyMemory translation service. Requests are capped in length, so longer
/// text is translated chunk by chunk.
pub struct MyMemoryTranslator {
    client: reqwest::Client,
    delay: Duration,
    chunk_limit: usize,
    /// Optional contact address, raises the anonymous daily quota.
    email: Option<String>,
}

impl MyMemoryTranslator {
    pub fn new(
        timeout: Duration,
        delay: Duration,
        chunk_limit: usize,
        email: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            delay,
            chunk_limit,
            email: email.filter(|v| !v.trim().is_empty()),
        })
    }

    async fn request_chunk(&self, chunk: &str, source: &str, target: &str) -> anyhow::Result<String> {
        pause(self.delay).await;

        let langpair = format!("{}|{}", language_code(source), language_code(target));
        let mut query = vec![("q", chunk), ("langpair", langpair.as_str())];
        if let Some(email) = &self.email {
            query.push(("de", email.as_str()));
        }

        let response = self.client.get(MYMEMORY_URL).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("mymemory returned {}", status);
        }

        let body: Value = response.json().await?;
        parse_mymemory_response(&body)
    }

    async fn request(&self, text: &str, source: &str, target: &str) -> anyhow::Result<String> {
        translate_chunked(text, self.chunk_limit, |chunk| async move {
            self.request_chunk(&chunk, source, target).await
        })
        .await
    }
}

/// Sends every chunk of `text` through `request_chunk` in order and puts the
/// paragraphs back together. Blank paragraphs are kept without a request.
pub(crate) async fn translate_chunked<F, Fut>(
    text: &str,
    limit: usize,
    mut request_chunk: F,
) -> anyhow::Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = anyhow::Result<String>>,
{
    let paragraphs = split_into_chunks(text, limit);
    let mut translated = Vec::with_capacity(paragraphs.len());

    for chunks in paragraphs {
        let mut paragraph = String::new();
        for chunk in chunks {
            debug!("translating chunk of {} chars", chunk.chars().count());
            paragraph.push_str(&request_chunk(chunk).await?);
        }
        translated.push(paragraph);
    }

    Ok(translated.join("\n"))
}

#[async_trait]
impl Translator for MyMemoryTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        guarded(text, || self.request(text, source, target)).await
    }
}

fn language_code(code: &str) -> &str {
    match code {
        "zh" => "zh-CN",
        _ => code,
    }
}

pub(crate) fn parse_mymemory_response(body: &Value) -> anyhow::Result<String> {
    // the status comes back as a number or as a numeric string
    let status = match body.get("responseStatus") {
        Some(Value::Number(v)) => v.as_u64(),
        Some(Value::String(v)) => v.parse().ok(),
        _ => None,
    };
    if status != Some(200) {
        let details = body
            .get("responseDetails")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        bail!("mymemory error {:?}: {}", status, details);
    }

    body.get("responseData")
        .and_then(|v| v.get("translatedText"))
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or(anyhow!("no translatedText in mymemory response"))
}
