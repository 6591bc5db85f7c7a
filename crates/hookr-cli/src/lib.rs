//! hookR CLI Library
//!
//! Session runner and output collaborators for `hookr listen`: renders hook
//! events to the terminal and optionally appends them to a file.

pub mod config;
pub mod output;
pub mod runner;
pub mod shutdown;
pub mod sink;
