use log::debug;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::SummarizerConfig;
use crate::error::SummarizeError;

const PROVIDER: &str = "openai";

/// One request in, one completion text out.
pub trait CompletionClient {
    fn model_name(&self) -> &str;

    fn complete(&self, system: &str, prompt: &str) -> Result<String, SummarizeError>;
}

/// OpenAI-compatible `/chat/completions` in JSON mode.
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(cfg: &SummarizerConfig, api_key: String) -> Result<Self, SummarizeError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
        })
    }
}

impl CompletionClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn complete(&self, system: &str, prompt: &str) -> Result<String, SummarizeError> {
        let body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(SummarizeError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("{status}: {}", detail.trim()),
            });
        }

        let parsed: ChatResponse = response.json()?;
        debug!("{} returned {} choices", self.model, parsed.choices.len());
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| SummarizeError::EmptyResponse {
                provider: PROVIDER.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_shape_deserializes() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"priority\":\"High\"}"}}]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some(r#"{"priority":"High"}"#)
        );
    }

    #[test]
    fn client_keeps_model_and_trims_base() {
        let cfg = SummarizerConfig {
            api_base: "http://localhost:11434/v1/".into(),
            model: "gpt-4o-mini".into(),
            ..SummarizerConfig::default()
        };
        let client = OpenAiClient::new(&cfg, "sk-test".into()).unwrap();
        assert_eq!(client.model_name(), "gpt-4o-mini");
        assert_eq!(client.api_base, "http://localhost:11434/v1");
    }
}
