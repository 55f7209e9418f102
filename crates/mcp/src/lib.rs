//! MCP client for Switchboard's subprocess backends.
//!
//! A [`ProtocolClient`] owns at most one child process speaking MCP over
//! stdio. The process is spawned lazily by [`ProtocolClient::connect`] (or by
//! the first call that needs it) and torn down by [`ProtocolClient::close`].
//!
//! ```text
//! ProtocolClient ──► Launcher ──► Transport ──► child stdin/stdout
//!       │                             ▲
//!       └── EnvelopeClassifier        └── rmcp in production, mocks in tests
//! ```

pub mod client;
pub mod envelope;
pub mod transport;

pub use client::{ClientTimeouts, ProtocolClient};
pub use envelope::{ContentPart, DefaultClassifier, EnvelopeClassifier, ToolEnvelope, ToolInfo};
pub use transport::{Launcher, RmcpTransport, ServerCommand, StdioLauncher, Transport};
