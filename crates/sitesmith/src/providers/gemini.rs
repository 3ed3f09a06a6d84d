use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::base::{Provider, Usage};
use super::configs::GeminiProviderConfig;
use super::utils::{
    gemini_response_to_message, gemini_usage, messages_to_gemini_spec, tools_to_gemini_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// Google's `generateContent` API
pub struct GeminiProvider {
    client: Client,
    config: GeminiProviderConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.host.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {}\n{}", status, body))
            }
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let mut payload = json!({
            "contents": messages_to_gemini_spec(messages),
            "systemInstruction": {"parts": [{"text": system}]},
        });

        let mut generation_config = serde_json::Map::new();
        if let Some(temp) = self.config.temperature {
            generation_config.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(tokens));
        }

        if let Some(fields) = payload.as_object_mut() {
            if !tools.is_empty() {
                fields.insert("tools".to_string(), json!(tools_to_gemini_spec(tools)?));
            }
            if !generation_config.is_empty() {
                fields.insert("generationConfig".to_string(), Value::Object(generation_config));
            }
        }

        debug!(model = %self.config.model, messages = messages.len(), "requesting generateContent");
        let response = self.post(payload).await?;

        if let Some(error) = response.get("error") {
            return Err(anyhow!("Gemini API error: {}", error));
        }

        let message = gemini_response_to_message(&response)?;
        Ok((message, gemini_usage(&response)))
    }
}
