//! Upstream generation request/response types.
//!
//! These model the data shapes exchanged with the remote inference
//! backend: the bounded context window, generation parameters, the
//! whole-response output, and streaming events.

use serde::{Deserialize, Serialize};

use crate::chat::{MessageRole, TokenUsage};

/// One turn of the context window sent upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Sampling parameters for one generation request.
///
/// The recognized option set is closed; callers supplying unknown options
/// are rejected at the API boundary rather than silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Upper bound on generated length. Must be positive.
    pub max_new_tokens: u32,
    /// Sampling randomness. Must be finite and non-negative.
    pub temperature: f64,
    /// Sample vs. greedy-decode.
    pub do_sample: bool,
}

impl GenerationParams {
    /// Validate parameter ranges. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_new_tokens == 0 {
            return Err("max_new_tokens must be positive".to_string());
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(format!(
                "temperature must be a non-negative real, got {}",
                self.temperature
            ));
        }
        Ok(())
    }
}

/// A fully-assembled request to the inference backend.
///
/// `messages` already ends with the current user turn; the backend sees
/// one ordered conversation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub messages: Vec<ContextMessage>,
    pub params: GenerationParams,
}

/// Whole-response output from the inference backend.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// Events produced while consuming an upstream generation stream.
///
/// The sequence is finite and not restartable: zero or more `Fragment`s
/// followed by at most one `Completed`. A stream that ends without a
/// terminal event surfaces as [`crate::error::UpstreamError::Interrupted`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental text fragment.
    Fragment { text: String },
    /// Terminal success event carrying the aggregate result.
    Completed {
        content: String,
        usage: Option<TokenUsage>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GenerationParams {
        GenerationParams {
            max_new_tokens: 256,
            temperature: 0.7,
            do_sample: true,
        }
    }

    #[test]
    fn test_params_valid() {
        assert!(params().validate().is_ok());
    }

    #[test]
    fn test_params_zero_tokens_rejected() {
        let p = GenerationParams {
            max_new_tokens: 0,
            ..params()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_params_negative_temperature_rejected() {
        let p = GenerationParams {
            temperature: -0.1,
            ..params()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_params_nan_temperature_rejected() {
        let p = GenerationParams {
            temperature: f64::NAN,
            ..params()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_params_greedy_zero_temperature_valid() {
        let p = GenerationParams {
            temperature: 0.0,
            do_sample: false,
            ..params()
        };
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_context_message_serde() {
        let msg = ContextMessage {
            role: MessageRole::User,
            content: "hello".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello"}"#);
    }
}
