//! Agent caller — the boundary between the workflow engine and a model API.
//!
//! The engine only knows the `AgentExecutor` trait: given a persona, a model
//! id, a resolved prompt and an optional attachment, return text (or a
//! `data:` URL for image output). `GeminiAgentCaller` implements it over the
//! Gemini `generateContent` HTTP API.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::workflow::persona::Persona;

/// A binary payload sent alongside the initial prompt (image, PDF, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Base64-encoded content
    pub data: String,
    pub mime_type: String,
}

impl Attachment {
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Read a file and guess its MIME type from the extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            WorkflowError::Config(format!(
                "Failed to read attachment '{}': {}",
                path.display(),
                e
            ))
        })?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        Ok(Self::from_bytes(&bytes, mime.essence_str()))
    }

    /// Decoded size, derived from the base64 length and its `=` padding.
    pub fn size_bytes(&self) -> usize {
        let padding = self.data.bytes().rev().take_while(|b| *b == b'=').count();
        (self.data.len() / 4 * 3).saturating_sub(padding)
    }
}

/// Format inline binary model output as a data URL.
pub fn data_url(mime_type: &str, base64_data: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64_data)
}

/// Executes one agent call.
///
/// Implementations must include the persona name and the cause in their
/// error (see [`WorkflowError::agent_execution`]).
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(
        &self,
        persona: &Persona,
        model: &str,
        prompt: &str,
        attachment: Option<&Attachment>,
    ) -> Result<String, WorkflowError>;
}

/// Connection settings for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: String,
}

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Read `GEMINI_API_KEY` (or `API_KEY`) and optional `GEMINI_BASE_URL`.
    pub fn from_env() -> Result<Self, WorkflowError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .unwrap_or_default();

        if api_key.trim().is_empty() {
            return Err(WorkflowError::Config(
                "No API key found. Set GEMINI_API_KEY or API_KEY env var.".to_string(),
            ));
        }

        let base_url = std::env::var("GEMINI_BASE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());

        Ok(Self { base_url, api_key })
    }
}

/// Image-capable models are asked for IMAGE + TEXT output and return the
/// first inline image as a data URL.
pub fn is_image_model(model: &str) -> bool {
    model.contains("-image")
}

/// Calls Gemini models over HTTP.
pub struct GeminiAgentCaller {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiAgentCaller {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self, WorkflowError> {
        Ok(Self::new(GeminiConfig::from_env()?))
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    /// POST {base_url}/v1beta/models/{model}:generateContent
    /// Headers:
    ///   x-goog-api-key: {api_key}
    ///   content-type: application/json
    async fn generate(&self, model: &str, body: &serde_json::Value) -> Result<serde_json::Value, String> {
        let url = self.endpoint(model);
        tracing::info!("[AgentCaller] Calling Gemini API: {} (model: {})", url, model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            return Err(format!("API returned {}: {}", status, response_text));
        }

        serde_json::from_str(&response_text)
            .map_err(|e| format!("Failed to parse response JSON: {}", e))
    }
}

#[async_trait]
impl AgentExecutor for GeminiAgentCaller {
    async fn execute(
        &self,
        persona: &Persona,
        model: &str,
        prompt: &str,
        attachment: Option<&Attachment>,
    ) -> Result<String, WorkflowError> {
        let body = build_request_body(persona, model, prompt, attachment);

        let result = match self.generate(model, &body).await {
            Ok(json) => extract_output(&json, is_image_model(model))
                .ok_or_else(|| "Response contained no usable content".to_string()),
            Err(e) => Err(e),
        };

        result.map_err(|reason| {
            tracing::error!("[AgentCaller] Agent '{}' failed: {}", persona.name, reason);
            WorkflowError::agent_execution(&persona.name, reason, attachment.is_some())
        })
    }
}

/// Build a `generateContent` request. The attachment part goes before the
/// text part.
pub fn build_request_body(
    persona: &Persona,
    model: &str,
    prompt: &str,
    attachment: Option<&Attachment>,
) -> serde_json::Value {
    let mut parts = Vec::new();
    if let Some(att) = attachment {
        parts.push(serde_json::json!({
            "inlineData": { "mimeType": att.mime_type, "data": att.data }
        }));
    }
    parts.push(serde_json::json!({ "text": prompt }));

    let mut body = serde_json::json!({
        "contents": [{ "role": "user", "parts": parts }]
    });

    if !persona.system_prompt.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{ "text": persona.system_prompt }]
        });
    }

    if is_image_model(model) {
        body["generationConfig"] = serde_json::json!({
            "responseModalities": ["IMAGE", "TEXT"]
        });
    }

    body
}

/// Pull the agent output out of a `generateContent` response.
///
/// In image mode the first inline data part wins; otherwise (or when no
/// image came back) the text parts are joined.
pub fn extract_output(json: &serde_json::Value, image_mode: bool) -> Option<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|cand| cand.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|p| p.as_array())?;

    if image_mode {
        let image = parts.iter().find_map(|part| {
            let inline = part.get("inlineData")?;
            let mime = inline.get("mimeType")?.as_str()?;
            let data = inline.get("data")?.as_str()?;
            Some(data_url(mime, data))
        });
        if image.is_some() {
            return image;
        }
    }

    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona() -> Persona {
        Persona::new("p-presenter", "Presenter", "Format nicely.")
    }

    #[test]
    fn test_attachment_from_bytes() {
        let att = Attachment::from_bytes(b"hello", "text/plain");
        assert_eq!(att.data, "aGVsbG8=");
        assert_eq!(att.mime_type, "text/plain");
        assert_eq!(att.size_bytes(), 5);
        assert_eq!(Attachment::from_bytes(b"hell", "text/plain").size_bytes(), 4);
        assert_eq!(Attachment::from_bytes(b"hel", "text/plain").size_bytes(), 3);
        assert_eq!(Attachment::from_bytes(b"", "text/plain").size_bytes(), 0);
    }

    #[test]
    fn test_attachment_from_file_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagram.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();
        let att = Attachment::from_file(&path).unwrap();
        assert_eq!(att.mime_type, "image/png");
        assert!(Attachment::from_file(dir.path().join("absent.pdf")).is_err());
    }

    #[test]
    fn test_request_body_text_model() {
        let body = build_request_body(&persona(), "gemini-2.5-flash", "Hi", None);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Format nicely.");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hi");
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_request_body_puts_attachment_first() {
        let att = Attachment::from_bytes(b"img", "image/jpeg");
        let body = build_request_body(&persona(), "gemini-2.5-flash-image-preview", "Draw", Some(&att));
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["text"], "Draw");
        assert_eq!(
            body["generationConfig"]["responseModalities"],
            serde_json::json!(["IMAGE", "TEXT"])
        );
    }

    #[test]
    fn test_extract_text_output() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hello " }, { "text": "world" }] } }]
        });
        assert_eq!(extract_output(&json, false).as_deref(), Some("Hello world"));
        assert_eq!(extract_output(&serde_json::json!({}), false), None);
    }

    #[test]
    fn test_extract_image_output_as_data_url() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [
                { "text": "Here is your image" },
                { "inlineData": { "mimeType": "image/png", "data": "QUJD" } }
            ] } }]
        });
        assert_eq!(
            extract_output(&json, true).as_deref(),
            Some("data:image/png;base64,QUJD")
        );
        assert_eq!(extract_output(&json, false).as_deref(), Some("Here is your image"));
    }

    #[test]
    fn test_is_image_model() {
        assert!(is_image_model("gemini-2.5-flash-image-preview"));
        assert!(!is_image_model("gemini-2.5-pro"));
    }
}
