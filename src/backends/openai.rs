//! OpenAI Responses API client with streaming replies.
//!
//! Sends the persona prompt as `instructions` and the user turn as `input`,
//! then reads `response.output_text.delta` events until the response
//! completes.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    chat::{
        create_response_sse_stream, ChatProvider, ChatRequest, ChatRole, FragmentStream, SseEvent,
        SseStep,
    },
    error::KindlyError,
    persona::ThinkingLevel,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for interacting with the OpenAI Responses API.
pub struct OpenAI {
    /// API key for bearer authentication
    api_key: String,
    /// API root, without trailing slash
    base_url: String,
    /// HTTP client for making API requests
    client: Client,
}

/// Request body for `POST /responses`
#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    /// Persona prompt as request-level instructions
    instructions: &'a str,
    input: Vec<ResponsesInputMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<ResponsesReasoning>,
}

#[derive(Serialize)]
struct ResponsesInputMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponsesReasoning {
    effort: &'static str,
}

/// Any streamed event; only the fields we act on are decoded.
#[derive(Deserialize)]
struct ResponsesEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<String>,
    message: Option<String>,
    code: Option<String>,
    response: Option<ResponsesStatus>,
}

#[derive(Deserialize)]
struct ResponsesStatus {
    error: Option<OpenAIErrorBody>,
    incomplete_details: Option<IncompleteDetails>,
}

#[derive(Deserialize)]
struct IncompleteDetails {
    reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIErrorWrapper {
    error: OpenAIErrorBody,
}

#[derive(Deserialize)]
struct OpenAIErrorBody {
    message: Option<String>,
    code: Option<String>,
}

impl OpenAIErrorBody {
    fn describe(self) -> String {
        let message = self.message.unwrap_or_else(|| "unknown error".to_string());
        match self.code {
            Some(code) if !code.is_empty() => format!("{code}: {message}"),
            _ => message,
        }
    }
}

impl OpenAI {
    /// Creates a new OpenAI client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenAI API key
    /// * `base_url` - API root (defaults to `https://api.openai.com/v1`)
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

fn reasoning_effort(level: ThinkingLevel) -> &'static str {
    match level {
        ThinkingLevel::Low => "low",
        ThinkingLevel::Medium => "medium",
        ThinkingLevel::High => "high",
    }
}

fn request_body<'a>(request: &'a ChatRequest<'a>) -> ResponsesRequest<'a> {
    let persona = request.persona;
    ResponsesRequest {
        model: &persona.model,
        instructions: &persona.system_prompt,
        input: request
            .messages
            .iter()
            .map(|msg| ResponsesInputMessage {
                role: match msg.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: &msg.content,
            })
            .collect(),
        stream: true,
        temperature: persona.temperature,
        top_p: persona.top_p,
        max_output_tokens: persona.max_tokens,
        reasoning: persona.thinking_level.map(|level| ResponsesReasoning {
            effort: reasoning_effort(level),
        }),
    }
}

/// Turns one SSE event of the Responses stream into a reply step.
fn parse_stream_event(event: SseEvent) -> Result<SseStep, KindlyError> {
    if event.data == "[DONE]" {
        return Ok(SseStep::Done);
    }

    let parsed: ResponsesEvent =
        serde_json::from_str(&event.data).map_err(|e| KindlyError::ResponseFormatError {
            message: format!("Failed to decode OpenAI stream event: {e}"),
            raw_response: event.data.clone(),
        })?;

    match parsed.kind.as_str() {
        "response.output_text.delta" => match parsed.delta {
            Some(delta) if !delta.is_empty() => Ok(SseStep::Fragment(delta)),
            _ => Ok(SseStep::Skip),
        },
        "response.completed" => Ok(SseStep::Done),
        "response.incomplete" => {
            let reason = parsed
                .response
                .and_then(|r| r.incomplete_details)
                .and_then(|d| d.reason)
                .unwrap_or_default();
            if reason == "content_filter" {
                Err(KindlyError::ProviderError(
                    "Reply blocked by provider content filter".to_string(),
                ))
            } else {
                log::debug!("openai reply incomplete: {reason}");
                Ok(SseStep::Done)
            }
        }
        "response.failed" => {
            let message = parsed
                .response
                .and_then(|r| r.error)
                .map(OpenAIErrorBody::describe)
                .unwrap_or_else(|| "response failed".to_string());
            Err(KindlyError::ProviderError(message))
        }
        "error" => Err(KindlyError::ProviderError(
            OpenAIErrorBody {
                message: parsed.message,
                code: parsed.code,
            }
            .describe(),
        )),
        _ => Ok(SseStep::Skip),
    }
}

fn map_http_error(status: StatusCode, body: String) -> KindlyError {
    let message = serde_json::from_str::<OpenAIErrorWrapper>(&body)
        .map(|wrapper| wrapper.error.describe())
        .unwrap_or(body);

    KindlyError::ProviderError(format!("OpenAI returned {status}: {message}"))
}

#[async_trait]
impl ChatProvider for OpenAI {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat_stream(&self, request: &ChatRequest<'_>) -> Result<FragmentStream, KindlyError> {
        if self.api_key.is_empty() {
            return Err(KindlyError::AuthError("Missing OpenAI API key".to_string()));
        }

        let body = request_body(request);
        let url = format!("{}/responses", self.base_url);

        log::debug!(
            "openai stream request: model={} messages={}",
            request.persona.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read OpenAI error body".to_string());
            log::warn!("openai request failed with {status}");
            return Err(map_http_error(status, text));
        }

        Ok(create_response_sse_stream(response, parse_stream_event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::PersonaConfig;

    fn event(kind: &str, data: &str) -> SseEvent {
        SseEvent {
            event: Some(kind.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn request_sends_instructions_and_one_input() {
        let persona = PersonaConfig::kindly().with_max_tokens(200);
        let request = ChatRequest::single_turn(&persona, "My teammate hogs the ball");
        let json = serde_json::to_value(request_body(&request)).unwrap();

        assert_eq!(json["model"], "gpt-5.1-mini");
        assert_eq!(json["instructions"], persona.system_prompt.as_str());
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_output_tokens"], 200);
        let input = json["input"].as_array().unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input[0]["role"], "user");
        assert_eq!(input[0]["content"], "My teammate hogs the ball");
        assert!(json.get("reasoning").is_none());
    }

    #[test]
    fn deltas_are_fragments_and_completion_ends() {
        let step = parse_stream_event(event(
            "response.output_text.delta",
            r#"{"type":"response.output_text.delta","item_id":"msg_1","output_index":0,"content_index":0,"delta":"It sounds "}"#,
        ))
        .unwrap();
        assert_eq!(step, SseStep::Fragment("It sounds ".to_string()));

        let step = parse_stream_event(event(
            "response.created",
            r#"{"type":"response.created","response":{"id":"resp_1"}}"#,
        ))
        .unwrap();
        assert_eq!(step, SseStep::Skip);

        let step = parse_stream_event(event(
            "response.completed",
            r#"{"type":"response.completed","response":{"id":"resp_1","status":"completed"}}"#,
        ))
        .unwrap();
        assert_eq!(step, SseStep::Done);
    }

    #[test]
    fn failures_become_provider_errors() {
        let err = parse_stream_event(event(
            "response.failed",
            r#"{"type":"response.failed","response":{"error":{"code":"server_error","message":"boom"}}}"#,
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "Provider Error: server_error: boom");

        let err = parse_stream_event(event(
            "error",
            r#"{"type":"error","code":"rate_limit_exceeded","message":"slow down"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, KindlyError::ProviderError(ref m) if m.contains("slow down")));

        let err = parse_stream_event(event(
            "response.incomplete",
            r#"{"type":"response.incomplete","response":{"incomplete_details":{"reason":"content_filter"}}}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, KindlyError::ProviderError(_)));
    }

    #[test]
    fn token_limit_ends_reply_normally() {
        let step = parse_stream_event(event(
            "response.incomplete",
            r#"{"type":"response.incomplete","response":{"incomplete_details":{"reason":"max_output_tokens"}}}"#,
        ))
        .unwrap();
        assert_eq!(step, SseStep::Done);
    }

    #[test]
    fn unauthorized_is_a_provider_error_with_status() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        match map_http_error(StatusCode::UNAUTHORIZED, body.to_string()) {
            KindlyError::ProviderError(message) => assert_eq!(
                message,
                "OpenAI returned 401 Unauthorized: invalid_api_key: Incorrect API key provided"
            ),
            other => panic!("unexpected error: {other}"),
        }
    }
}
