//! Infrastructure implementations: SQLite persistence, the HTTP
//! inference client, and environment-driven configuration.

pub mod config;
pub mod llm;
pub mod sqlite;
