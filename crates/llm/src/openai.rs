use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use switchboard_common::{Result, SwitchboardError};
use tracing::debug;

use crate::client::{LlmClient, LlmRequest, LlmResponse, Role, TextStream, TokenUsage};

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    model: Option<String>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Deserialize, Default)]
struct OpenAiDelta {
    content: Option<String>,
}

/// Client for any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    extra_headers: Vec<(String, String)>,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    /// `endpoint` is the full completions URL; defaults to OpenRouter.
    pub fn new(endpoint: Option<String>, model: String, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model,
            api_key,
            extra_headers: Vec::new(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Add a header sent with every request, e.g. `HTTP-Referer`.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn role_to_string(role: &Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn build_messages(request: &LlmRequest) -> Vec<OpenAiMessage> {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system_prompt {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
            });
        }
        for msg in &request.messages {
            messages.push(OpenAiMessage {
                role: Self::role_to_string(&msg.role).to_string(),
                content: Some(msg.content.clone()),
            });
        }
        messages
    }

    fn build_body(&self, request: &LlmRequest, stream: bool) -> OpenAiRequest {
        OpenAiRequest {
            model: self.model.clone(),
            messages: Self::build_messages(request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        }
    }

    fn build_http_request(&self, body: &OpenAiRequest) -> reqwest::RequestBuilder {
        let mut http_req = self.http_client.post(&self.endpoint).json(body);
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }
        for (name, value) in &self.extra_headers {
            http_req = http_req.header(name.as_str(), value.as_str());
        }
        http_req
    }
}

/// Classify one SSE line. Non-data lines and empty deltas are skipped.
fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map(SseLine::Text)
            .unwrap_or(SseLine::Skip),
        Err(e) => {
            debug!(error = %e, "Skipping unparseable stream chunk");
            SseLine::Skip
        }
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Text(String),
    Done,
    Skip,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = self.build_body(&request, false);

        let response = self
            .build_http_request(&body)
            .send()
            .await
            .map_err(|e| SwitchboardError::Llm(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(SwitchboardError::Llm(format!(
                "OpenAI API error {status}: {body_text}"
            )));
        }

        let oai_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| SwitchboardError::Llm(format!("Failed to parse OpenAI response: {e}")))?;

        let choice = oai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SwitchboardError::Llm("No choices in OpenAI response".to_string()))?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: oai_response.model.unwrap_or_else(|| self.model.clone()),
            usage: oai_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u
                    .total_tokens
                    .max(u.prompt_tokens.saturating_add(u.completion_tokens)),
            }),
            finish_reason: choice.finish_reason,
        })
    }

    fn complete_stream(&self, request: LlmRequest) -> TextStream {
        let body = self.build_body(&request, true);
        let http_req = self.build_http_request(&body);

        Box::pin(async_stream::stream! {
            let response = match http_req.send().await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(SwitchboardError::Llm(format!("OpenAI stream request failed: {e}")));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body_text = response.text().await.unwrap_or_default();
                yield Err(SwitchboardError::Llm(format!("OpenAI API error {status}: {body_text}")));
                return;
            }

            let mut bytes = response.bytes_stream();
            // Raw bytes: a multi-byte character may span two chunks.
            let mut buffer: Vec<u8> = Vec::new();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(SwitchboardError::Llm(format!("Failed to read stream chunk: {e}")));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
                    let line = String::from_utf8_lossy(&raw[..newline_pos]);

                    match parse_sse_line(&line) {
                        SseLine::Text(text) => yield Ok(text),
                        SseLine::Done => break 'read,
                        SseLine::Skip => {}
                    }
                }
            }
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
