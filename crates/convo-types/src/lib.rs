//! Shared domain types for the convo inference relay.
//!
//! Pure data types with no I/O: sessions and messages, generation
//! request/response shapes for the upstream backend, the resolved
//! configuration struct, and the error taxonomy.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
