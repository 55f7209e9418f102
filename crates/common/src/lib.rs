//! Common types shared across Switchboard crates.
//!
//! Holds the error taxonomy every component reports through and the
//! orchestration event pipeline that the router and hub emit into.

pub mod error;
pub mod events;

pub use error::{Result, SwitchboardError};
pub use events::{
    EventSink, JsonlSink, MemorySink, Observer, OrchestrationEvent, Severity, TracingSink,
    unix_ms_now,
};
