//! Envelope decoding for the hookR WebSocket protocol.
//!
//! Every inbound frame is a JSON object tagged with a category. This module
//! turns frames into [`Envelope`] values, implementing a tolerant reader:
//! unknown fields are ignored and unknown categories are surfaced as
//! [`Envelope::Unknown`] rather than errors.

mod parser;
mod types;

pub use parser::{decode_frame, decode_value, normalize_category};
pub use types::*;
