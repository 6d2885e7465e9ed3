//! Conversational fallback and chat-model backends.
//!
//! The fallback receives every utterance the local rules do not claim. It
//! wraps a stateful [`ChatSession`] and never fails outward: an uninitialized
//! session yields a fixed message and a failed call is turned into a reply.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{Provider, Settings};
use crate::error::ChatError;

/// Persona prepended to every query.
pub const PERSONA: &str = "You are Jarvis, an advanced AI personal assistant inspired by Iron Man's AI. \
You are helpful, intelligent, and have a sophisticated personality. \
Respond in a concise, friendly, and professional manner. \
Keep responses brief unless asked for detailed information.";

/// Reply used when no chat session could be created.
pub const NOT_INITIALIZED: &str =
    "I'm not fully initialized yet. Please make sure the API key is set.";

/// Default Gemini REST endpoint.
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default Ollama endpoint for local LLM inference.
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Upper bound for one chat round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest error body quoted back in a [`ChatError::Status`].
const MAX_ERROR_BODY: usize = 200;

/// A running conversation with a remote model.
///
/// Implementations keep prior turns and replay them on each `send`; a
/// failed `send` leaves the context unchanged.
#[async_trait]
pub trait ChatSession: Send {
    /// Sends one user message and returns the model's reply.
    async fn send(&mut self, message: &str) -> Result<String, ChatError>;

    /// Forgets every prior turn.
    fn reset(&mut self);

    /// Short backend name for logs.
    fn provider(&self) -> &'static str;
}

/// Wraps the utterance with the persona preamble.
pub fn enhance_query(query: &str) -> String {
    format!("{PERSONA}\n\nUser query: {query}")
}

/// Fallback for utterances no local rule claims.
pub struct ConversationalFallback {
    session: Option<Box<dyn ChatSession>>,
}

impl ConversationalFallback {
    pub fn new(session: Box<dyn ChatSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Degraded fallback that answers [`NOT_INITIALIZED`] without any call.
    pub fn uninitialized() -> Self {
        Self { session: None }
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Answers `text` through the session.
    ///
    /// # Returns
    /// The model's reply, [`NOT_INITIALIZED`], or an apology that embeds the
    /// failure description. Never an error.
    pub async fn respond(&mut self, text: &str) -> String {
        let Some(session) = self.session.as_mut() else {
            return NOT_INITIALIZED.to_string();
        };
        match session.send(&enhance_query(text)).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(provider = session.provider(), error = %err, "chat request failed");
                format!("I encountered an error: {err}")
            }
        }
    }

    /// Starts a fresh conversation.
    pub fn reset(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.reset();
        }
    }
}

/// Builds the fallback described by `settings`.
///
/// # Details
/// Gemini without an API key yields the degraded fallback; Ollama needs no
/// credential.
pub fn build_fallback(settings: &Settings) -> ConversationalFallback {
    let endpoint = settings.endpoint.as_deref();
    match settings.provider {
        Provider::Gemini => match GeminiSession::from_settings(settings) {
            Ok(session) => {
                info!(model = settings.model(), "gemini chat session ready");
                ConversationalFallback::new(Box::new(session))
            }
            Err(err) => {
                warn!(error = %err, "chat fallback disabled");
                ConversationalFallback::uninitialized()
            }
        },
        Provider::Ollama => {
            info!(model = settings.model(), "ollama chat session ready");
            ConversationalFallback::new(Box::new(OllamaSession::new(settings.model(), endpoint)))
        }
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Turns a non-success response into [`ChatError::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(ChatError::Status {
        status: status.as_u16(),
        body,
    })
}

/// One turn in a Gemini conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

impl GeminiContent {
    fn new(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![GeminiPart {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: &'a [GeminiContent],
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Chat session against Gemini's `generateContent` endpoint.
pub struct GeminiSession {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    contents: Vec<GeminiContent>,
}

impl GeminiSession {
    pub fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            contents: Vec::new(),
        }
    }

    /// Session for the key, model and endpoint in `settings`.
    ///
    /// # Errors
    /// [`ChatError::MissingCredential`] when no API key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, ChatError> {
        let key = settings.api_key().ok_or(ChatError::MissingCredential {
            provider: "gemini",
        })?;
        Ok(Self::new(key, settings.model(), settings.endpoint.as_deref()))
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn request<'a>(contents: &'a [GeminiContent]) -> GeminiRequest<'a> {
        GeminiRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: 0.9,
                top_p: 1.0,
                top_k: 1,
                max_output_tokens: 2048,
            },
            safety_settings: HARM_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn send(&mut self, message: &str) -> Result<String, ChatError> {
        let mut contents = self.contents.clone();
        contents.push(GeminiContent::new("user", message));
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request(&contents))
            .send()
            .await?;
        let parsed: GeminiResponse = check_status(response).await?.json().await?;
        let reply = parsed
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .map(|part| part.text)
            .collect::<String>();
        if reply.trim().is_empty() {
            return Err(ChatError::EmptyReply);
        }
        contents.push(GeminiContent::new("model", &reply));
        self.contents = contents;
        Ok(reply)
    }

    fn reset(&mut self) {
        self.contents.clear();
    }

    fn provider(&self) -> &'static str {
        "gemini"
    }
}

/// Chat message structure for the Ollama API.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: ChatMessage,
}

/// Chat session against a local Ollama server.
pub struct OllamaSession {
    client: reqwest::Client,
    model: String,
    base_url: String,
    history: Vec<ChatMessage>,
}

impl OllamaSession {
    pub fn new(model: &str, base_url: Option<&str>) -> Self {
        Self {
            client: http_client(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or(OLLAMA_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            history: Vec::new(),
        }
    }
}

#[async_trait]
impl ChatSession for OllamaSession {
    async fn send(&mut self, message: &str) -> Result<String, ChatError> {
        let mut messages = self.history.clone();
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: message.to_string(),
        });
        let request = OllamaRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
        };
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;
        let parsed: OllamaResponse = check_status(response).await?.json().await?;
        if parsed.message.content.trim().is_empty() {
            return Err(ChatError::EmptyReply);
        }
        let reply = parsed.message.content.clone();
        messages.push(parsed.message);
        self.history = messages;
        Ok(reply)
    }

    fn reset(&mut self) {
        self.history.clear();
    }

    fn provider(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChat;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gemini_reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
        }))
    }

    #[tokio::test]
    async fn uninitialized_fallback_answers_without_calling() {
        let mut fallback = ConversationalFallback::uninitialized();
        assert!(!fallback.is_initialized());
        assert_eq!(fallback.respond("hello").await, NOT_INITIALIZED);
    }

    #[tokio::test]
    async fn fallback_prepends_persona() {
        let (chat, recorder) = ScriptedChat::new();
        let mut fallback = ConversationalFallback::new(Box::new(chat));
        let reply = fallback.respond("tell me a joke").await;
        assert_eq!(reply, "reply #1");
        let sent = recorder.sent();
        assert!(sent[0].starts_with(PERSONA));
        assert!(sent[0].ends_with("\n\nUser query: tell me a joke"));
    }

    #[tokio::test]
    async fn fallback_folds_errors_into_reply() {
        let (chat, _recorder) = ScriptedChat::new();
        let chat = chat.then(Err(ChatError::EmptyReply));
        let mut fallback = ConversationalFallback::new(Box::new(chat));
        assert_eq!(
            fallback.respond("hi").await,
            "I encountered an error: the model returned an empty reply"
        );
    }

    #[tokio::test]
    async fn fallback_reset_clears_session() {
        let (chat, recorder) = ScriptedChat::new();
        let mut fallback = ConversationalFallback::new(Box::new(chat));
        fallback.respond("one").await;
        fallback.reset();
        fallback.respond("two").await;
        assert_eq!(recorder.resets(), 1);
        assert_eq!(recorder.context_at_send(), [0, 0]);
    }

    #[test]
    fn gemini_requires_a_key() {
        let settings = Settings::default();
        assert!(matches!(
            GeminiSession::from_settings(&settings),
            Err(ChatError::MissingCredential { provider: "gemini" })
        ));
        assert!(!build_fallback(&settings).is_initialized());
        let with_key = Settings {
            api_key: Some("k".repeat(30)),
            ..Settings::default()
        };
        assert!(build_fallback(&with_key).is_initialized());
        let ollama = Settings {
            provider: Provider::Ollama,
            ..Settings::default()
        };
        assert!(build_fallback(&ollama).is_initialized());
    }

    #[tokio::test]
    async fn gemini_session_replays_prior_turns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": {"topK": 1, "maxOutputTokens": 2048}
            })))
            .respond_with(gemini_reply("Hello!"))
            .mount(&server)
            .await;

        let mut session = GeminiSession::new("test-key", "gemini-pro", Some(&server.uri()));
        assert_eq!(session.send("hi").await.unwrap(), "Hello!");
        assert_eq!(session.send("again").await.unwrap(), "Hello!");

        let requests = server.received_requests().await.unwrap();
        let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        let contents = second["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(second["safetySettings"].as_array().unwrap().len(), 4);

        session.reset();
        session.send("fresh").await.unwrap();
        let requests = server.received_requests().await.unwrap();
        let third: serde_json::Value = serde_json::from_slice(&requests[2].body).unwrap();
        assert_eq!(third["contents"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gemini_status_error_keeps_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
            .mount(&server)
            .await;

        let mut session = GeminiSession::new("k", "gemini-pro", Some(&server.uri()));
        let err = session.send("hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Status { status: 403, .. }));
        assert!(session.contents.is_empty());
    }

    #[tokio::test]
    async fn gemini_empty_candidates_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let mut session = GeminiSession::new("k", "gemini-pro", Some(&server.uri()));
        assert!(matches!(
            session.send("hi").await,
            Err(ChatError::EmptyReply)
        ));
    }

    #[tokio::test]
    async fn ollama_session_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "llama3.2:3b", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "Hi from Ollama"}
            })))
            .mount(&server)
            .await;

        let mut session = OllamaSession::new("llama3.2:3b", Some(&server.uri()));
        assert_eq!(session.send("hello").await.unwrap(), "Hi from Ollama");
        assert_eq!(session.history.len(), 2);
        session.reset();
        assert!(session.history.is_empty());
    }
}
