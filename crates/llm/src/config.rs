use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use switchboard_common::{Result, SwitchboardError};
use tracing::warn;

use crate::agent::HostedAgent;
use crate::client::{LlmClient, LlmRequest, LlmResponse, TextStream};
use crate::openai::OpenAiClient;

/// Connection settings for one hosted model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    /// Full chat-completions URL. Defaults to OpenRouter.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Explicit key. Prefer `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Sent as `HTTP-Referer` for provider attribution.
    #[serde(default)]
    pub referer: Option<String>,
    /// Sent as `X-Title` for provider attribution.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}

fn default_max_concurrent() -> usize {
    4
}

impl LlmConfig {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            endpoint: None,
            api_key: None,
            api_key_env: default_api_key_env(),
            system_prompt: system_prompt.into(),
            temperature: None,
            max_tokens: None,
            referer: None,
            title: None,
            max_concurrent_requests: default_max_concurrent(),
        }
    }

    /// Resolve the API key from config, then from `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key
            && !key.is_empty()
        {
            return Some(key.clone());
        }

        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| SwitchboardError::Llm(format!("Semaphore acquire failed: {e}")))?;
        self.inner.complete(request).await
    }

    fn complete_stream(&self, request: LlmRequest) -> TextStream {
        let semaphore = self.semaphore.clone();
        let mut inner = self.inner.complete_stream(request);

        // The permit is held until the stream finishes or is dropped.
        Box::pin(async_stream::stream! {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    yield Err(SwitchboardError::Llm(format!("Semaphore acquire failed: {e}")));
                    return;
                }
            };
            while let Some(item) = inner.next().await {
                yield item;
            }
        })
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

pub fn build_llm_client(config: &LlmConfig) -> Arc<dyn LlmClient> {
    let api_key = config.resolve_api_key();
    if api_key.is_none() {
        warn!(
            model = %config.model,
            env = %config.api_key_env,
            "No API key configured; requests will be sent unauthenticated"
        );
    }

    let mut client = OpenAiClient::new(config.endpoint.clone(), config.model.clone(), api_key);
    if let Some(ref referer) = config.referer {
        client = client.with_header("HTTP-Referer", referer.clone());
    }
    if let Some(ref title) = config.title {
        client = client.with_header("X-Title", title.clone());
    }

    Arc::new(SemaphoredClient::new(
        Arc::new(client),
        config.max_concurrent_requests,
    ))
}

pub fn build_hosted_agent(name: &str, config: &LlmConfig) -> HostedAgent {
    HostedAgent::new(name, config.system_prompt.clone(), build_llm_client(config))
        .with_defaults(config.temperature, config.max_tokens)
}
