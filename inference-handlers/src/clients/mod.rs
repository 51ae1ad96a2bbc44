//! External Service Clients
//!
//! Narrow contracts for the collaborators the handlers call out to, each
//! with one production implementation.

pub mod database;
pub mod openai;
pub mod secrets;

pub use database::{Database, DatabaseError, MySqlDatabase, QueryRow};
pub use openai::{ChatMessage, LanguageModel, LlmConfig, LlmError, OpenAiClient, Role};
pub use secrets::{AwsSecretsProvider, DbCredentials, SecretsError, SecretsProvider};
