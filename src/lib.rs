//! Eventide: assistant orchestration core for an event-scheduling product.
//!
//! A caller message passes through the agent-tier rate limiter into a
//! bounded reasoning loop that calls scheduling tools against the record
//! store, then the finished exchange is appended to the caller's
//! conversation memory.

pub mod agent;
pub mod assistant;
pub mod auth;
pub mod calendar;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod notify;
pub mod rate_limit;
pub mod safety;
pub mod store;
pub mod tools;

pub use assistant::{Assistant, AssistantDeps, TurnRequest};
pub use config::Config;
pub use error::AssistantError;
