//! Ollama embedding endpoint (`/api/embed`).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embed::EmbedError;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    api_base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(api_base_url: String, model: String, timeout_seconds: u64) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| EmbedError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, api_base_url, model })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let payload = EmbedRequest { model: &self.model, input: text };
        debug!(model = %self.model, text_len = text.len(), "sending embedding request");

        let response = self
            .client
            .post(&self.api_base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.api_base_url, error = %e, "embedding request failed (transport)");
                EmbedError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "embedding endpoint returned HTTP error");
            return Err(EmbedError::Request(format!("HTTP {status}: {body}")));
        }

        let parsed = response
            .json::<EmbedResponse>()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;

        parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::InvalidResponse("no embeddings in response".into()))
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_shape_parses() {
        let r: EmbedResponse =
            serde_json::from_str(r#"{"model":"all-minilm","embeddings":[[0.1,0.2,0.3]]}"#).unwrap();
        assert_eq!(r.embeddings, vec![vec![0.1, 0.2, 0.3]]);
    }

    #[test]
    fn request_shape_serializes() {
        let json = serde_json::to_value(EmbedRequest { model: "m", input: "orders" }).unwrap();
        assert_eq!(json, serde_json::json!({ "model": "m", "input": "orders" }));
    }
}
