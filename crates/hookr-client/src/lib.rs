//! hookR Relay Client
//!
//! Owns the WebSocket session to the hookR fan-out service: authenticates,
//! decodes inbound envelopes, reconnects with backoff, and dispatches typed
//! events to registered observers in arrival order.

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
mod transport;

pub use client::{CloseHandle, ConnectionInfo, ConnectionState, RelayClient};
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::RelayError;
pub use registry::{CallbackId, CallbackRegistry, Category};
