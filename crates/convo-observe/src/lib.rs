//! Observability: tracing subscriber setup and GenAI span attribute
//! conventions.

pub mod genai_attrs;
pub mod tracing_setup;
