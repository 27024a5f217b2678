//! HTTP client for the upstream text-generation backend.

pub mod http;
pub mod protocol;
pub mod streaming;

pub use http::HttpInferenceClient;
