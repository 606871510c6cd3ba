//! Ollama text generation (`/api/generate`, non-streaming).
//!
//! The system and user prompts are joined into a single `prompt` string;
//! sampling is bounded by `temperature` and `num_predict`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::ProviderError;

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    num_predict: u32,
}

impl OllamaProvider {
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        num_predict: u32,
        timeout_seconds: u64,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, model, temperature, num_predict })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let payload = GenerateRequest {
            model: &self.model,
            prompt: format!("{system}\n\n{user}"),
            stream: false,
            options: GenerateOptions { temperature: self.temperature, num_predict: self.num_predict },
        };

        debug!(
            model = %self.model,
            num_predict = self.num_predict,
            prompt_len = payload.prompt.len(),
            "sending LLM request"
        );
        trace!(prompt = %payload.prompt, "full LLM prompt");

        let response = self
            .client
            .post(&self.api_base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            let message = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(b) => format!("HTTP {status}: {}", b.error),
                Err(_) => format!("HTTP {status}: {body}"),
            };
            error!(%status, %message, "LLM request returned HTTP error");
            return Err(ProviderError::Request(message));
        }

        let parsed = response.json::<GenerateResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::Request("empty response from model".into()));
        }
        debug!(reply_len = text.len(), "received LLM response");
        Ok(text)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_options_and_disables_streaming() {
        let req = GenerateRequest {
            model: "qwen2.5:3b",
            prompt: "sys\n\nuser".into(),
            stream: false,
            options: GenerateOptions { temperature: 0.0, num_predict: 120 },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 120);
        assert_eq!(json["prompt"], "sys\n\nuser");
    }

    #[test]
    fn response_field_is_read() {
        let r: GenerateResponse =
            serde_json::from_str(r#"{"model":"m","response":" db.users.find({}) ","done":true}"#).unwrap();
        assert_eq!(r.response.trim(), "db.users.find({})");
    }
}
