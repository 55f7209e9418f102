//! Local tools.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_common::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Content,
    Marketplace,
    Financial,
    Dev,
    Research,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolCategory::Content => "content",
            ToolCategory::Marketplace => "marketplace",
            ToolCategory::Financial => "financial",
            ToolCategory::Dev => "dev",
            ToolCategory::Research => "research",
        };
        f.write_str(s)
    }
}

/// Something the hub can execute by name.
#[async_trait]
pub trait LocalTool: Send + Sync {
    async fn execute(&self, args: Value) -> Result<Value>;
}

type BoxedFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Adapts an async closure into a [`LocalTool`].
struct FnTool<F>(F);

#[async_trait]
impl<F> LocalTool for FnTool<F>
where
    F: Fn(Value) -> BoxedFuture + Send + Sync,
{
    async fn execute(&self, args: Value) -> Result<Value> {
        (self.0)(args).await
    }
}

#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub tool: Arc<dyn LocalTool>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
        tool: Arc<dyn LocalTool>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            tool,
        }
    }

    /// Build a descriptor from an async closure.
    ///
    /// ```ignore
    /// ToolDescriptor::from_fn("echo", "Echo args", ToolCategory::Dev, |args| async move { Ok(args) });
    /// ```
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let boxed = move |args: Value| -> BoxedFuture { Box::pin(f(args)) };
        Self::new(name, description, category, Arc::new(FnTool(boxed)))
    }

    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category,
        }
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

/// What callers see when listing tools, local or remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
}
