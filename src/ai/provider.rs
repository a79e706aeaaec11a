// src/ai/provider.rs
//! Concrete LLM providers. Both speak plain HTTPS through reqwest and return the raw
//! completion text; parsing happens in `ai::parse`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::LlmClient;
use crate::error::AiError;

const USER_AGENT: &str = concat!("news-poster/", env!("CARGO_PKG_VERSION"));

fn http_client(timeout: Duration) -> Result<reqwest::Client, AiError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .timeout(timeout)
        .build()
        .map_err(AiError::from)
}

// ------------------------------------------------------------
// Gemini (generateContent)
// ------------------------------------------------------------

pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub const DEFAULT_MODEL: &'static str = "gemini-1.5-flash";

    pub fn new(api_key: String, model: Option<&str>, timeout: Duration) -> Result<Self, AiError> {
        Ok(Self {
            http: http_client(timeout)?,
            api_key,
            model: model.unwrap_or(Self::DEFAULT_MODEL).to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct GeminiReq<'a> {
    contents: Vec<GeminiContent<'a>>,
}
#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}
#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}
#[derive(Deserialize)]
struct GeminiResp {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}
#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiRespContent>,
}
#[derive(Deserialize)]
struct GeminiRespContent {
    #[serde(default)]
    parts: Vec<GeminiRespPart>,
}
#[derive(Deserialize)]
struct GeminiRespPart {
    #[serde(default)]
    text: String,
}

impl LlmClient for GeminiProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!(
                "{}/models/{}:generateContent",
                self.base_url.trim_end_matches('/'),
                self.model
            );
            let req = GeminiReq {
                contents: vec![GeminiContent {
                    parts: vec![GeminiPart { text: prompt }],
                }],
            };
            let resp = self
                .http
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&req)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(AiError::Status(resp.status().as_u16()));
            }
            let body: GeminiResp = resp.json().await?;
            let text = body
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|c| {
                    c.parts
                        .into_iter()
                        .map(|p| p.text)
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default();
            non_empty(text)
        })
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

// ------------------------------------------------------------
// OpenAI (chat completions)
// ------------------------------------------------------------

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(api_key: String, model: Option<&str>, timeout: Duration) -> Result<Self, AiError> {
        Ok(Self {
            http: http_client(timeout)?,
            api_key,
            model: model.unwrap_or(Self::DEFAULT_MODEL).to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}
#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}
#[derive(Deserialize)]
struct ChatResp {
    #[serde(default)]
    choices: Vec<Choice>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}
#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient for OpenAiProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>> {
        Box::pin(async move {
            let req = ChatReq {
                model: &self.model,
                messages: vec![Msg {
                    role: "user",
                    content: prompt,
                }],
                temperature: 0.3,
            };
            let resp = self
                .http
                .post(format!(
                    "{}/chat/completions",
                    self.base_url.trim_end_matches('/')
                ))
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(AiError::Status(resp.status().as_u16()));
            }
            let body: ChatResp = resp.json().await?;
            let text = body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            non_empty(text)
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

fn non_empty(text: String) -> Result<String, AiError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(AiError::EmptyResponse)
    } else {
        Ok(trimmed.to_string())
    }
}
