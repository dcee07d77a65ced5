use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CommentaryGenerator;
use crate::error::CommentaryError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for a local Ollama server's non-streaming generate endpoint.
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, CommentaryError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(OllamaClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl CommentaryGenerator for OllamaClient {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String, CommentaryError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        debug!("Requesting commentary from {} ({})", self.generate_url(), self.model);

        let resp = self.http.post(self.generate_url()).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            warn!("Ollama error {}: {}", status, body);
            return Err(CommentaryError::Status {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: GenerateResponse = resp.json().await?;
        let text = parsed.response.trim();
        if text.is_empty() {
            return Err(CommentaryError::Empty);
        }
        Ok(text.to_string())
    }
}
