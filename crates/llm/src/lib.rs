pub mod agent;
pub mod client;
pub mod config;
pub mod openai;

pub use agent::{AgentOutcome, ExecuteOptions, HostedAgent};
pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role, TextStream, TokenUsage};
pub use config::{LlmConfig, SemaphoredClient, build_hosted_agent, build_llm_client};
pub use openai::OpenAiClient;
