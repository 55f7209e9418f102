//! Hosted model agents.
//!
//! A [`HostedAgent`] wraps an [`LlmClient`] with a fixed system prompt and
//! default sampling settings. Its [`execute`](HostedAgent::execute) never
//! fails: transport errors, non-2xx replies and malformed bodies all come back
//! as an [`AgentOutcome`] with `success == false`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{ChatMessage, LlmClient, LlmRequest, TextStream};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Per-call overrides for [`HostedAgent::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Prior turns, oldest first, inserted between the system prompt and the
    /// new prompt.
    pub history: Vec<ChatMessage>,
}

impl ExecuteOptions {
    pub fn max_tokens(max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub success: bool,
    pub content: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentOutcome {
    pub fn failure(model: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            model: model.into(),
            tokens_used: None,
            error: Some(error.into()),
        }
    }
}

pub struct HostedAgent {
    name: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    client: Arc<dyn LlmClient>,
}

impl HostedAgent {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        client: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            client,
        }
    }

    pub fn with_defaults(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        if let Some(t) = temperature {
            self.temperature = t;
        }
        if let Some(m) = max_tokens {
            self.max_tokens = m;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        self.client.model_name()
    }

    fn build_request(&self, prompt: &str, options: ExecuteOptions) -> LlmRequest {
        let mut messages = options.history;
        messages.push(ChatMessage::user(prompt));

        LlmRequest {
            system_prompt: Some(self.system_prompt.clone()).filter(|s| !s.is_empty()),
            messages,
            temperature: Some(options.temperature.unwrap_or(self.temperature)),
            max_tokens: Some(options.max_tokens.unwrap_or(self.max_tokens)),
        }
    }

    pub async fn execute(&self, prompt: &str, options: ExecuteOptions) -> AgentOutcome {
        let request = self.build_request(prompt, options);
        debug!(agent = %self.name, model = %self.model(), turns = request.messages.len(), "Executing hosted agent");

        match self.client.complete(request).await {
            Ok(response) => AgentOutcome {
                success: true,
                content: response.content,
                model: response.model,
                tokens_used: response.usage.map(|u| u.total_tokens),
                error: None,
            },
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Hosted agent call failed");
                AgentOutcome::failure(self.model(), e.to_string())
            }
        }
    }

    /// Stream the completion as text fragments.
    pub fn stream(&self, prompt: &str, options: ExecuteOptions) -> TextStream {
        let request = self.build_request(prompt, options);
        self.client.complete_stream(request)
    }

    /// Cheap liveness probe.
    pub async fn ping(&self) -> bool {
        self.execute("ping", ExecuteOptions::max_tokens(10))
            .await
            .success
    }
}

impl std::fmt::Debug for HostedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedAgent")
            .field("name", &self.name)
            .field("model", &self.model())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LlmResponse, Role, TokenUsage};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Mutex;
    use switchboard_common::{Result, SwitchboardError};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<LlmRequest>>);

    impl Recorder {
        fn push(&self, r: LlmRequest) {
            self.0.lock().unwrap().push(r);
        }

        fn last(&self) -> LlmRequest {
            self.0.lock().unwrap().last().cloned().unwrap()
        }
    }

    struct MockClient {
        fail: bool,
        seen: Arc<Recorder>,
    }

    #[async_trait]
    impl LlmClient for MockClient {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            self.seen.push(request);
            if self.fail {
                return Err(SwitchboardError::Llm("OpenAI API error 503: down".into()));
            }
            Ok(LlmResponse {
                content: "pong".into(),
                model: "mock-model".into(),
                usage: Some(TokenUsage {
                    prompt_tokens: 3,
                    completion_tokens: 1,
                    total_tokens: 4,
                }),
                finish_reason: Some("stop".into()),
            })
        }

        fn complete_stream(&self, _request: LlmRequest) -> TextStream {
            Box::pin(futures::stream::iter(vec![
                Ok("po".to_string()),
                Ok("ng".to_string()),
            ]))
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    fn agent(fail: bool) -> (HostedAgent, Arc<Recorder>) {
        let seen = Arc::new(Recorder::default());
        let client = Arc::new(MockClient {
            fail,
            seen: seen.clone(),
        });
        (HostedAgent::new("kate", "You are KATE.", client), seen)
    }

    #[tokio::test]
    async fn execute_reports_content_and_tokens() {
        let (agent, seen) = agent(false);
        let outcome = agent.execute("ping", ExecuteOptions::default()).await;

        assert!(outcome.success);
        assert_eq!(outcome.content, "pong");
        assert_eq!(outcome.tokens_used, Some(4));
        assert!(outcome.error.is_none());

        let request = seen.last();
        assert_eq!(request.system_prompt.as_deref(), Some("You are KATE."));
        assert_eq!(request.temperature, Some(DEFAULT_TEMPERATURE));
        assert_eq!(request.max_tokens, Some(DEFAULT_MAX_TOKENS));
    }

    #[tokio::test]
    async fn execute_places_history_before_prompt() {
        let (agent, seen) = agent(false);
        let options = ExecuteOptions {
            temperature: Some(0.2),
            max_tokens: None,
            history: vec![ChatMessage::user("first"), ChatMessage::assistant("reply")],
        };
        agent.execute("second", options).await;

        let request = seen.last();
        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(request.messages[2].content, "second");
        assert_eq!(request.temperature, Some(0.2));
    }

    #[tokio::test]
    async fn execute_never_fails() {
        let (agent, _) = agent(true);
        let outcome = agent.execute("ping", ExecuteOptions::default()).await;

        assert!(!outcome.success);
        assert!(outcome.content.is_empty());
        assert!(outcome.error.unwrap().contains("503"));
        assert_eq!(outcome.model, "mock-model");
    }

    #[tokio::test]
    async fn ping_uses_small_budget() {
        let (agent, seen) = agent(false);
        assert!(agent.ping().await);
        assert_eq!(seen.last().max_tokens, Some(10));
    }

    #[tokio::test]
    async fn stream_yields_fragments() {
        let (agent, _) = agent(false);
        let parts: Vec<String> = agent
            .stream("ping", ExecuteOptions::default())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(parts.concat(), "pong");
    }
}
