//! `hookR` Core Library
//!
//! Shared functionality for `hookR` components:
//! - Hook event model as delivered by the fan-out service
//! - Envelope decoding for the WebSocket wire protocol
//! - Common error types
//! - Tracing initialization

pub mod envelope;
pub mod error;
pub mod event;
pub mod tracing_init;

pub use envelope::{decode_frame, decode_value, Envelope};
pub use error::{Error, Result};
pub use event::{HookEvent, ReceivedAt};
