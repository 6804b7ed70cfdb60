//! Google Gemini API client with streaming replies.
//!
//! Calls `models/{model}:streamGenerateContent?alt=sse` and turns every SSE
//! event into one reply fragment.
//!
//! # Features
//! - Persona system prompt sent as `systemInstruction`
//! - Generation config (temperature, max tokens, top_p, top_k, thinking level)
//! - Safety thresholds forwarded as `safetySettings`
//! - Safety blocks surfaced as provider errors
//!
//! # Example
//! ```no_run
//! use futures::StreamExt;
//! use kindly::backends::google::Google;
//! use kindly::chat::{ChatProvider, ChatRequest};
//! use kindly::persona::PersonaConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Google::new("your-api-key", None, None)?;
//!     let persona = PersonaConfig::friendly();
//!     let request = ChatRequest::single_turn(&persona, "My friend ignores me.");
//!
//!     let mut stream = client.chat_stream(&request).await?;
//!     while let Some(fragment) = stream.next().await {
//!         print!("{}", fragment?);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    chat::{
        create_response_sse_stream, ChatProvider, ChatRequest, ChatRole, FragmentStream, SseEvent,
        SseStep,
    },
    error::KindlyError,
    persona::{SafetySetting, ThinkingLevel},
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons meaning the provider refused to produce the reply.
const BLOCKED_FINISH_REASONS: [&str; 5] = [
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

/// Client for interacting with Google's Gemini API.
pub struct Google {
    /// API key for authentication with Google's API
    api_key: String,
    /// API root, without trailing slash
    base_url: String,
    /// HTTP client for making API requests
    client: Client,
}

/// Request body for streaming generation
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleStreamRequest<'a> {
    /// List of conversation messages
    contents: Vec<GoogleChatContent<'a>>,
    /// Persona prompt, sent outside the conversation
    system_instruction: GoogleSystemInstruction<'a>,
    /// Optional generation parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GoogleGenerationConfig>,
    #[serde(skip_serializing_if = "no_safety_settings")]
    safety_settings: &'a [SafetySetting],
}

fn no_safety_settings(settings: &&[SafetySetting]) -> bool {
    settings.is_empty()
}

/// Individual message in a chat conversation
#[derive(Serialize)]
struct GoogleChatContent<'a> {
    /// Role of the message sender ("user" or "model")
    role: &'a str,
    /// Content parts of the message
    parts: Vec<GoogleContentPart<'a>>,
}

#[derive(Serialize)]
struct GoogleSystemInstruction<'a> {
    parts: Vec<GoogleContentPart<'a>>,
}

/// Text content within a chat message
#[derive(Serialize)]
struct GoogleContentPart<'a> {
    /// The actual text content
    text: &'a str,
}

/// Configuration parameters for text generation
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig {
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Top-p sampling parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    /// Top-k sampling parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<GoogleThinkingConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleThinkingConfig {
    thinking_level: ThinkingLevel,
}

/// One streamed `GenerateContentResponse`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleStreamChunk {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    prompt_feedback: Option<GooglePromptFeedback>,
    error: Option<GoogleErrorBody>,
}

/// Individual completion candidate
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    /// Content of the candidate response
    content: Option<GoogleResponseContent>,
    finish_reason: Option<String>,
}

/// Content block within a response
#[derive(Deserialize)]
struct GoogleResponseContent {
    /// Parts making up the content
    #[serde(default)]
    parts: Vec<GoogleResponsePart>,
}

/// Individual part of response content
#[derive(Deserialize)]
struct GoogleResponsePart {
    /// Text content of this part
    text: Option<String>,
    /// Thought summaries are not part of the reply
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GooglePromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GoogleErrorWrapper {
    error: GoogleErrorBody,
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

impl GoogleErrorBody {
    fn describe(self) -> String {
        let message = self.message.unwrap_or_else(|| "unknown error".to_string());
        match (self.status, self.code) {
            (Some(status), _) if !status.is_empty() => format!("{status}: {message}"),
            (_, Some(code)) => format!("{code}: {message}"),
            _ => message,
        }
    }
}

impl Google {
    /// Creates a new Google Gemini client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Google API key for authentication
    /// * `base_url` - API root (defaults to the public v1beta endpoint)
    /// * `timeout_seconds` - Request timeout in seconds
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        timeout_seconds: Option<u64>,
    ) -> Result<Self, KindlyError> {
        let mut builder = Client::builder();
        if let Some(sec) = timeout_seconds {
            builder = builder.timeout(std::time::Duration::from_secs(sec));
        }
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: builder.build()?,
        })
    }
}

fn request_body<'a>(request: &'a ChatRequest<'a>) -> GoogleStreamRequest<'a> {
    let persona = request.persona;

    let contents = request
        .messages
        .iter()
        .map(|msg| GoogleChatContent {
            role: match msg.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            },
            parts: vec![GoogleContentPart { text: &msg.content }],
        })
        .collect();

    // Gemini rejects an empty generationConfig object
    let generation_config = if persona.max_tokens.is_none()
        && persona.temperature.is_none()
        && persona.top_p.is_none()
        && persona.top_k.is_none()
        && persona.thinking_level.is_none()
    {
        None
    } else {
        Some(GoogleGenerationConfig {
            max_output_tokens: persona.max_tokens,
            temperature: persona.temperature,
            top_p: persona.top_p,
            top_k: persona.top_k,
            thinking_config: persona
                .thinking_level
                .map(|thinking_level| GoogleThinkingConfig { thinking_level }),
        })
    };

    GoogleStreamRequest {
        contents,
        system_instruction: GoogleSystemInstruction {
            parts: vec![GoogleContentPart {
                text: &persona.system_prompt,
            }],
        },
        generation_config,
        safety_settings: &persona.safety_settings,
    }
}

/// Turns one SSE event of `streamGenerateContent` into a reply step.
fn parse_stream_event(event: SseEvent) -> Result<SseStep, KindlyError> {
    let chunk: GoogleStreamChunk =
        serde_json::from_str(&event.data).map_err(|e| KindlyError::ResponseFormatError {
            message: format!("Failed to decode Gemini stream event: {e}"),
            raw_response: event.data.clone(),
        })?;

    if let Some(error) = chunk.error {
        return Err(KindlyError::ProviderError(error.describe()));
    }

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(KindlyError::ProviderError(format!(
            "Message blocked by provider safety filter ({reason})"
        )));
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(SseStep::Skip);
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKED_FINISH_REASONS.contains(&reason) {
            return Err(KindlyError::ProviderError(format!(
                "Reply blocked by provider safety filter ({reason})"
            )));
        }
    }

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| !part.thought)
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        Ok(SseStep::Skip)
    } else {
        Ok(SseStep::Fragment(text))
    }
}

fn map_http_error(status: StatusCode, body: String) -> KindlyError {
    let message = serde_json::from_str::<GoogleErrorWrapper>(&body)
        .map(|wrapper| wrapper.error.describe())
        .unwrap_or(body);

    KindlyError::ProviderError(format!("Gemini returned {status}: {message}"))
}

#[async_trait]
impl ChatProvider for Google {
    fn name(&self) -> &str {
        "google"
    }

    async fn chat_stream(&self, request: &ChatRequest<'_>) -> Result<FragmentStream, KindlyError> {
        if self.api_key.is_empty() {
            return Err(KindlyError::AuthError("Missing Google API key".to_string()));
        }

        let body = request_body(request);
        let url = format!(
            "{base}/models/{model}:streamGenerateContent?alt=sse",
            base = self.base_url,
            model = request.persona.model,
        );

        log::debug!(
            "gemini stream request: model={} messages={}",
            request.persona.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            log::warn!("gemini request failed with {status}");
            return Err(map_http_error(status, text));
        }

        Ok(create_response_sse_stream(response, parse_stream_event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::PersonaConfig;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn request_carries_persona_as_configuration() {
        let persona = PersonaConfig::friendly().with_temperature(0.3);
        let request = ChatRequest::single_turn(&persona, "I am mad at Sam");
        let json = serde_json::to_value(request_body(&request)).unwrap();

        assert_eq!(json["contents"].as_array().unwrap().len(), 1);
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "I am mad at Sam");
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            persona.system_prompt.as_str()
        );
        assert_eq!(json["generationConfig"]["thinkingConfig"]["thinkingLevel"], "HIGH");
        assert!((json["generationConfig"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(json["safetySettings"][0]["threshold"], "BLOCK_LOW_AND_ABOVE");
    }

    #[test]
    fn empty_generation_config_is_omitted() {
        let mut persona = PersonaConfig::friendly();
        persona.thinking_level = None;
        persona.safety_settings.clear();
        let request = ChatRequest::single_turn(&persona, "hi");
        let json = serde_json::to_value(request_body(&request)).unwrap();
        assert!(json.get("generationConfig").is_none());
        assert!(json.get("safetySettings").is_none());
    }

    #[test]
    fn text_parts_become_one_fragment() {
        let step = parse_stream_event(event(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"I hear "},{"text":"you."}]}}]}"#,
        ))
        .unwrap();
        assert_eq!(step, SseStep::Fragment("I hear you.".to_string()));
    }

    #[test]
    fn thoughts_and_empty_chunks_are_skipped() {
        let step = parse_stream_event(event(
            r#"{"candidates":[{"content":{"parts":[{"text":"planning","thought":true}]}}]}"#,
        ))
        .unwrap();
        assert_eq!(step, SseStep::Skip);

        let step = parse_stream_event(event(
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":12}}"#,
        ))
        .unwrap();
        assert_eq!(step, SseStep::Skip);
    }

    #[test]
    fn safety_blocks_are_provider_errors() {
        let err = parse_stream_event(event(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#))
            .unwrap_err();
        assert!(matches!(err, KindlyError::ProviderError(ref m) if m.contains("SAFETY")));

        let err = parse_stream_event(event(
            r#"{"candidates":[{"content":{"parts":[{"text":"partial"}]},"finishReason":"PROHIBITED_CONTENT"}]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, KindlyError::ProviderError(_)));
    }

    #[test]
    fn malformed_event_is_a_format_error() {
        let err = parse_stream_event(event("{not json")).unwrap_err();
        match err {
            KindlyError::ResponseFormatError { raw_response, .. } => {
                assert_eq!(raw_response, "{not json")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn http_errors_use_provider_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        let err = map_http_error(StatusCode::BAD_REQUEST, body.to_string());
        assert_eq!(
            err.to_string(),
            "Provider Error: Gemini returned 400 Bad Request: INVALID_ARGUMENT: API key not valid."
        );
        assert_eq!(
            map_http_error(StatusCode::FORBIDDEN, "denied".to_string()).to_string(),
            "Provider Error: Gemini returned 403 Forbidden: denied"
        );
    }
}
