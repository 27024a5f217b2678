//! Core domain logic: session lifecycle, context window assembly, the
//! inference client seam, and per-session turn coordination.
//!
//! Everything here is storage- and transport-agnostic; `convo-infra`
//! supplies the SQLite repository and the HTTP inference client.

pub mod context;
pub mod llm;
pub mod session;
pub mod turn;

#[cfg(test)]
pub(crate) mod testing;
