//! Resolved configuration consumed by the core.
//!
//! Loading and validation from the environment lives in `convo-infra`;
//! the core only ever sees these resolved values.

use std::time::Duration;

use crate::llm::GenerationParams;

/// Relay behavior knobs: context bounds, timeouts, and generation defaults.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Base address of the upstream inference backend.
    pub upstream_url: String,
    /// Maximum prior turns included in the context window. 0 means
    /// stateless turns (history is still persisted, just not sent).
    pub max_context_messages: usize,
    /// Defaults applied when a chat request omits generation params.
    pub default_params: GenerationParams,
    /// Idle sessions older than this are expired lazily on access.
    pub session_timeout: Duration,
    /// Deadline for whole-response upstream calls.
    pub request_timeout: Duration,
    /// Inter-fragment idle deadline for streaming calls; no data for this
    /// long is treated as a stream interruption.
    pub stream_idle_timeout: Duration,
    /// Upper bound on inbound message length, in characters.
    pub max_message_chars: usize,
    /// Fixed system message prepended to the context window, if any.
    pub system_prompt: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_url: "http://localhost:8000".to_string(),
            max_context_messages: 10,
            default_params: GenerationParams {
                max_new_tokens: 256,
                temperature: 0.7,
                do_sample: true,
            },
            session_timeout: Duration::from_secs(24 * 3600),
            request_timeout: Duration::from_secs(60),
            stream_idle_timeout: Duration::from_secs(30),
            max_message_chars: 32_768,
            system_prompt: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = RelayConfig::default();
        assert_eq!(config.max_context_messages, 10);
        assert_eq!(config.default_params.max_new_tokens, 256);
        assert!((config.default_params.temperature - 0.7).abs() < f64::EPSILON);
        assert!(config.default_params.do_sample);
        assert_eq!(config.session_timeout, Duration::from_secs(86_400));
        assert!(config.system_prompt.is_none());
    }
}
