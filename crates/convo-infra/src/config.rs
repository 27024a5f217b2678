//! Environment-driven configuration.
//!
//! All knobs are `CONVO_*` environment variables with sensible defaults;
//! unparsable values fall back to the default with a warning rather than
//! aborting startup.

use std::time::Duration;

use tracing::warn;

use convo_types::config::RelayConfig;

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub relay: RelayConfig,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (tests inject maps).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = RelayConfig::default();

        let relay = RelayConfig {
            upstream_url: lookup("CONVO_UPSTREAM_URL")
                .unwrap_or(defaults.upstream_url)
                .trim_end_matches('/')
                .to_string(),
            max_context_messages: parsed(
                &lookup,
                "CONVO_MAX_CONTEXT_MESSAGES",
                defaults.max_context_messages,
            ),
            default_params: convo_types::llm::GenerationParams {
                max_new_tokens: parsed(
                    &lookup,
                    "CONVO_DEFAULT_MAX_TOKENS",
                    defaults.default_params.max_new_tokens,
                ),
                temperature: parsed(
                    &lookup,
                    "CONVO_DEFAULT_TEMPERATURE",
                    defaults.default_params.temperature,
                ),
                do_sample: defaults.default_params.do_sample,
            },
            session_timeout: Duration::from_secs(
                parsed(&lookup, "CONVO_SESSION_TIMEOUT_HOURS", 24u64) * 3600,
            ),
            request_timeout: Duration::from_secs(parsed(
                &lookup,
                "CONVO_REQUEST_TIMEOUT_SECS",
                60u64,
            )),
            stream_idle_timeout: Duration::from_secs(parsed(
                &lookup,
                "CONVO_STREAM_IDLE_TIMEOUT_SECS",
                30u64,
            )),
            max_message_chars: parsed(
                &lookup,
                "CONVO_MAX_MESSAGE_CHARS",
                defaults.max_message_chars,
            ),
            system_prompt: lookup("CONVO_SYSTEM_PROMPT").filter(|s| !s.trim().is_empty()),
        };

        Self {
            host: lookup("CONVO_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "CONVO_PORT", 8080),
            database_path: lookup("CONVO_DB_PATH").unwrap_or_else(|| "convo.db".to_string()),
            relay,
        }
    }

    /// Connection URL for the SQLite pool, creating the file if missing.
    pub fn database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.database_path)
    }
}

fn parsed<T: std::str::FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "unparsable setting, using default");
            default
        }),
        None => default,
    }
}
