//! Hugging Face inference API client

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::llm::prompt::format_for_model;
use crate::llm::TextGenerator;

const API_BASE: &str = "https://api-inference.huggingface.co/models";

/// HTTP client for hosted PLLuM/Mistral text generation.
///
/// Without an API key the client never goes to the network and
/// returns a fixed offline notice instead, so the bot stays usable
/// for local testing.
pub struct PllumClient {
    http: reqwest::Client,
    api_key: Option<String>,
    timeout: Duration,
}

impl PllumClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        if api_key.is_none() {
            warn!("no API key configured, running in offline mode with canned responses");
        }
        Self {
            http: reqwest::Client::new(),
            api_key,
            timeout,
        }
    }

    fn offline_notice(prompt: &str) -> String {
        let looks_polish =
            prompt.contains("Polish") || prompt.chars().any(|c| "ąćęłńóśźż".contains(c));
        if looks_polish {
            "Przepraszam, ale działam w trybie testowym bez dostępu do API. Potrzebuję klucza \
             PLLUM_API_KEY, aby generować prawdziwe odpowiedzi."
                .to_string()
        } else {
            "I'm sorry, but I'm running in test mode without API access. I need a PLLUM_API_KEY \
             to generate real responses."
                .to_string()
        }
    }

    fn extract_generated_text(value: &serde_json::Value) -> Option<String> {
        // The API usually answers `[{"generated_text": ...}]`, but a
        // bare object shows up on some model backends.
        let text = value
            .get(0)
            .and_then(|entry| entry.get("generated_text"))
            .or_else(|| value.get("generated_text"))
            .and_then(|t| t.as_str())?;
        Some(text.trim().to_string())
    }
}

#[async_trait]
impl TextGenerator for PllumClient {
    async fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            return Ok(Self::offline_notice(prompt));
        };

        info!(model = model_id, "calling inference API");
        let body = serde_json::json!({
            "inputs": format_for_model(model_id, prompt),
            "parameters": {
                "max_new_tokens": max_tokens,
                "temperature": temperature,
                "return_full_text": false,
                "do_sample": true,
            }
        });

        let response = self
            .http
            .post(format!("{API_BASE}/{model_id}"))
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "inference API returned {status}: {detail}"
            )));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("invalid response body: {e}")))?;

        Self::extract_generated_text(&value)
            .ok_or_else(|| Error::Generation(format!("unexpected response shape: {value}")))
    }
}
