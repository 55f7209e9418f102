//! Task routing for Switchboard.
//!
//! The router turns a free-text task into a call on one backend:
//!
//! ```text
//! task text
//!     │ classify (ordered keyword rules, first match wins)
//!     ▼
//! backend ──► resolve operation (explicit > planner > default)
//!     │
//!     ├─► ProtocolClient::call_tool   (subprocess backends)
//!     └─► HostedAgent::execute        (hosted backends)
//! ```
//!
//! Subprocess failures come back as `Err`. Hosted backends never fail: their
//! `success == false` outcomes are returned as data inside
//! [`DispatchOutcome`].

pub mod config;
pub mod planner;
pub mod retry;
pub mod router;
pub mod routing;

pub use config::{
    AgentDescriptor, BackendKind, HostedBackend, OperationSpec, RouterConfig, RuleConfig,
    SubprocessBackend,
};
pub use planner::{OperationPlanner, PlannedOperation};
pub use retry::RetryConfig;
pub use router::{Backend, DispatchOutcome, DispatchResult, TaskRouter};
pub use routing::{RouteDecision, RoutingRule, RuleSet};
