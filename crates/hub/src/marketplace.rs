//! Default marketplace tools and workflows.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use switchboard_llm::HostedAgent;

use crate::builtin::{PromptTool, WebhookTool};
use crate::tool::{ToolCategory, ToolDescriptor};
use crate::workflow::WorkflowDescriptor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Endpoint behind `notify_matching_users`.
    #[serde(default = "default_notify_url")]
    pub notify_url: String,
    /// Environment variable holding the endpoint's bearer token.
    #[serde(default = "default_notify_token_env")]
    pub notify_token_env: Option<String>,
    /// Hosted backend behind the analysis and research tools.
    #[serde(default = "default_analyst")]
    pub analyst: String,
    /// Hosted backend behind the copywriting tools.
    #[serde(default = "default_writer")]
    pub writer: String,
}

fn default_notify_url() -> String {
    "https://piata-ai.ro/api/cron/shopping-agents-runner".into()
}

fn default_notify_token_env() -> Option<String> {
    Some("CRON_SECRET".into())
}

fn default_analyst() -> String {
    "grok".into()
}

fn default_writer() -> String {
    "kate".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            notify_url: default_notify_url(),
            notify_token_env: default_notify_token_env(),
            analyst: default_analyst(),
            writer: default_writer(),
        }
    }
}

/// Hosted agents the default tools run on.
#[derive(Clone)]
pub struct MarketplaceAgents {
    /// Analysis and research prompts.
    pub analyst: Arc<HostedAgent>,
    /// Copywriting prompts.
    pub writer: Arc<HostedAgent>,
}

pub fn default_tools(agents: &MarketplaceAgents, config: &ToolsConfig) -> Vec<ToolDescriptor> {
    let prompt = |agent: &Arc<HostedAgent>, template: &str| -> Arc<PromptTool> {
        Arc::new(PromptTool::new(agent.clone(), template))
    };

    vec![
        ToolDescriptor::new(
            "seo_optimize",
            "Optimize marketplace listings for SEO and engagement",
            ToolCategory::Content,
            prompt(
                &agents.analyst,
                "Optimize this for SEO: {text}\n\nContext: {context}",
            ),
        ),
        ToolDescriptor::new(
            "market_impact_analysis",
            "Analyze the potential market impact of a new listing or trend",
            ToolCategory::Marketplace,
            prompt(&agents.analyst, "Analyze the market impact of: {topic}"),
        ),
        notify_tool(config),
        ToolDescriptor::new(
            "social_ad_generation",
            "Generate high-conversion social media ads for marketplace listings",
            ToolCategory::Content,
            prompt(&agents.writer, "Create a viral social media ad for: {text}"),
        ),
        ToolDescriptor::new(
            "scrape_market_trends",
            "Research current market trends from competing marketplaces",
            ToolCategory::Research,
            prompt(
                &agents.analyst,
                "Research current hot categories and price trends on Romanian marketplaces.",
            ),
        ),
    ]
}

/// The notification webhook. Needs no hosted agent.
pub fn notify_tool(config: &ToolsConfig) -> ToolDescriptor {
    ToolDescriptor::new(
        "notify_matching_users",
        "Find matching shopping agents and notify their users",
        ToolCategory::Financial,
        Arc::new(WebhookTool::new(
            config.notify_url.clone(),
            config.notify_token_env.clone(),
        )),
    )
}

pub fn default_workflows() -> Vec<WorkflowDescriptor> {
    vec![
        WorkflowDescriptor::new(
            "listing_boost_masterpiece",
            "Listing Boost Masterpiece",
            vec![
                "seo_optimize",
                "market_impact_analysis",
                "social_ad_generation",
                "notify_matching_users",
            ],
        ),
        WorkflowDescriptor::new(
            "autonomous_marketing_cycle",
            "Autonomous Marketing Cycle",
            vec![
                "scrape_market_trends",
                "market_impact_analysis",
                "seo_optimize",
                "social_ad_generation",
            ],
        ),
    ]
}
