//! Tool adapters over hosted agents and HTTP endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use switchboard_common::{Result, SwitchboardError};
use switchboard_llm::{ExecuteOptions, HostedAgent};
use tracing::{debug, warn};

use crate::tool::LocalTool;
use crate::workflow::CARRY_KEY;

/// Runs a prompt template through a hosted agent.
///
/// `{field}` placeholders are filled from the call arguments. A field that is
/// absent falls back to the previous workflow step's `content`, so a chained
/// step can consume the text an earlier step produced.
pub struct PromptTool {
    agent: Arc<HostedAgent>,
    template: String,
}

impl PromptTool {
    pub fn new(agent: Arc<HostedAgent>, template: impl Into<String>) -> Self {
        Self {
            agent,
            template: template.into(),
        }
    }
}

#[async_trait]
impl LocalTool for PromptTool {
    async fn execute(&self, args: Value) -> Result<Value> {
        let prompt = render_template(&self.template, &args);
        debug!(agent = %self.agent.name(), prompt_len = prompt.len(), "Running prompt tool");

        let outcome = self.agent.execute(&prompt, ExecuteOptions::default()).await;
        if !outcome.success {
            return Err(SwitchboardError::tool_call(
                self.agent.name(),
                outcome.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }

        Ok(json!({
            "content": outcome.content,
            "model": outcome.model,
            "tokens_used": outcome.tokens_used,
        }))
    }
}

pub fn render_template(template: &str, args: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let key = &rest[open + 1..open + close];
        out.push_str(&lookup(args, key));
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

fn lookup(args: &Value, key: &str) -> String {
    let value = args
        .get(key)
        .filter(|v| !v.is_null())
        .or_else(|| args.get(CARRY_KEY).and_then(|prev| prev.get("content")));

    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Calls an HTTP endpoint with GET and returns its JSON body.
///
/// The bearer token is read from `token_env` at call time. A non-2xx response
/// is reported in the result rather than as an error; only transport
/// failures fail the step.
pub struct WebhookTool {
    client: reqwest::Client,
    url: String,
    token_env: Option<String>,
}

impl WebhookTool {
    pub fn new(url: impl Into<String>, token_env: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token_env,
        }
    }
}

#[async_trait]
impl LocalTool for WebhookTool {
    async fn execute(&self, _args: Value) -> Result<Value> {
        let mut request = self.client.get(&self.url);
        if let Some(ref env) = self.token_env {
            match std::env::var(env) {
                Ok(token) if !token.is_empty() => request = request.bearer_auth(token),
                _ => warn!(env = %env, "Webhook token not set, calling without authorization"),
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| SwitchboardError::tool_call(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.url, status = %status, "Webhook returned non-success status");
            return Ok(json!({
                "success": false,
                "status": status.as_u16(),
                "message": format!("Server responded with status {}", status.as_u16()),
            }));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SwitchboardError::tool_call(&self.url, e))?;
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_fills_fields() {
        let args = json!({"text": "Vintage lamp", "price": 40});
        assert_eq!(
            render_template("Optimize {text} priced {price}", &args),
            "Optimize Vintage lamp priced 40"
        );
    }

    #[test]
    fn template_falls_back_to_previous_step() {
        let args = json!({"lastStepResult": {"content": "Brass lamp, restored"}});
        assert_eq!(
            render_template("Create an ad for: {text}", &args),
            "Create an ad for: Brass lamp, restored"
        );
    }

    #[test]
    fn template_without_value_or_braces() {
        assert_eq!(render_template("Hello {name}!", &json!({})), "Hello !");
        assert_eq!(render_template("Research trends", &json!({})), "Research trends");
        assert_eq!(render_template("open { brace", &json!({})), "open { brace");
    }
}
