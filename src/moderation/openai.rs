//! Classifier backed by an OpenAI-compatible chat completions API.
//!
//! The model is asked for structured output matching [`Decision`] through a
//! strict JSON schema. Anything that does not parse is an error; the gate
//! never turns a broken answer into `allow`.

use super::classifier::{Classifier, ClassifierError, ImageSample, TextSample};
use super::Decision;
use crate::app_config::ModerationConfig;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const SYSTEM_TEXT: &str = "You are a strict safety and abuse classifier for a public Dutch and English language website. \
Assess the user content for: nsfw (sexual content), weapons, alcohol, drugs, gore (graphic violence), \
offensive symbols (including extremist or hate symbols) and hateful content, profanity or abusive language \
(Dutch and English), spam, spam email or phishing patterns, and malicious or suspicious URLs.\n\
Hard rules:\n\
- If profanity or abusive language appears anywhere, action MUST be \"block\" and severity MUST be \"high\".\n\
- If a malicious or suspicious URL appears anywhere, action MUST be at least \"review\".\n\
- When in doubt choose action \"review\", never \"allow\".\n\
Judge malicious_url on textual heuristics: URL shorteners, unusual TLDs, obfuscation, phishing language, credential theft.\n\
Answer with structured data that matches the schema exactly.";

const SYSTEM_IMAGE: &str = "You are a strict safety and abuse classifier for a public website. \
Assess the uploaded image for: nsfw (sexual content), gore (graphic violence), \
and offensive symbols (including extremist or hate symbols).\n\
Hard rules:\n\
- If offensive symbols appear anywhere, action MUST be \"block\" and severity MUST be \"high\".\n\
- When in doubt choose action \"review\", never \"allow\".\n\
Answer with structured data that matches the schema exactly.";

/// JSON schema of the verdict, mirrored by [`Decision`]'s serde layout.
fn verdict_schema() -> Value {
    let flag = json!({ "type": "boolean" });
    let list = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["action", "severity", "categories", "found", "reasons"],
        "properties": {
            "action": { "type": "string", "enum": ["allow", "warn", "review", "block"] },
            "severity": { "type": "string", "enum": ["low", "medium", "high"] },
            "categories": {
                "type": "object",
                "additionalProperties": false,
                "required": [
                    "nsfw", "weapons", "alcohol", "drugs", "gore", "offensive_symbols",
                    "profanity", "spam", "spam_email", "malicious_url"
                ],
                "properties": {
                    "nsfw": flag, "weapons": flag, "alcohol": flag, "drugs": flag,
                    "gore": flag, "offensive_symbols": flag, "profanity": flag,
                    "spam": flag, "spam_email": flag, "malicious_url": flag
                }
            },
            "found": {
                "type": "object",
                "additionalProperties": false,
                "required": ["profanity_terms", "suspicious_phrases", "urls", "suspicious_urls", "notes"],
                "properties": {
                    "profanity_terms": list, "suspicious_phrases": list, "urls": list,
                    "suspicious_urls": list, "notes": list
                }
            },
            "reasons": list
        }
    })
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

pub struct OpenAiClassifier {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiClassifier {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        if api_key.is_empty() {
            return Err(ClassifierError::NotConfigured(
                "moderation.api_key / OPENAI_API_KEY is not set".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("agora/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClassifierError::NotConfigured(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &ModerationConfig) -> Result<Self, ClassifierError> {
        Self::new(
            &config.endpoint,
            &config.model,
            &config.api_key,
            Duration::from_secs(config.timeout_seconds),
        )
    }

    fn request_body(&self, system: &str, user_content: Value) -> Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user_content }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "guard_result",
                    "strict": true,
                    "schema": verdict_schema()
                }
            }
        })
    }

    async fn complete(&self, body: Value) -> Result<Decision, ClassifierError> {
        let url = format!("{}/chat/completions", self.endpoint);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(ClassifierError::Status(status.as_u16(), snippet));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        parse_completion(completion)
    }
}

fn parse_completion(completion: ChatCompletion) -> Result<Decision, ClassifierError> {
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ClassifierError::InvalidResponse("no choices".to_string()))?;

    if let Some(refusal) = message.refusal {
        return Err(ClassifierError::InvalidResponse(format!(
            "model refused: {}",
            refusal
        )));
    }

    let content = message
        .content
        .ok_or_else(|| ClassifierError::InvalidResponse("empty message".to_string()))?;

    serde_json::from_str(&content).map_err(|e| ClassifierError::InvalidResponse(e.to_string()))
}

/// `data:` URL for inline image submission.
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn classify_text(&self, sample: TextSample) -> Result<Decision, ClassifierError> {
        let user = format!(
            "Context: {}\n\nTITLE:\n{}\n\nBODY:\n{}",
            sample.context, sample.title, sample.body
        );
        let body = self.request_body(SYSTEM_TEXT, Value::String(user));
        self.complete(body).await
    }

    async fn classify_image(&self, sample: ImageSample) -> Result<Decision, ClassifierError> {
        let content = json!([
            {
                "type": "text",
                "text": format!("Context: {}. Classify this image.", sample.context)
            },
            {
                "type": "image_url",
                "image_url": { "url": data_url(&sample.mime, &sample.bytes) }
            }
        ]);
        let body = self.request_body(SYSTEM_IMAGE, content);
        self.complete(body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::Action;

    #[test]
    fn test_data_url() {
        assert_eq!(data_url("image/png", b"abc"), "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_missing_key_is_not_configured() {
        let result = OpenAiClassifier::new("http://x", "m", "", Duration::from_secs(1));
        assert!(matches!(result, Err(ClassifierError::NotConfigured(_))));
    }

    #[test]
    fn test_parse_completion() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "choices": [{ "message": { "content": r#"{"action":"review","severity":"medium","categories":{},"found":{},"reasons":["x"]}"# } }]
        }))
        .unwrap();
        let decision = parse_completion(completion).unwrap();
        assert_eq!(decision.action, Action::Review);
        assert_eq!(decision.reasons, vec!["x"]);
    }

    #[test]
    fn test_parse_completion_rejects_garbage() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "choices": [{ "message": { "content": "I think it is fine" } }]
        }))
        .unwrap();
        assert!(matches!(
            parse_completion(completion),
            Err(ClassifierError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_completion_refusal() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "choices": [{ "message": { "content": null, "refusal": "no" } }]
        }))
        .unwrap();
        assert!(parse_completion(completion).is_err());
    }

    #[test]
    fn test_schema_lists_every_category() {
        let schema = verdict_schema();
        let required = schema["properties"]["categories"]["required"]
            .as_array()
            .unwrap();
        assert_eq!(required.len(), 10);
    }
}
