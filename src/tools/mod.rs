//! Tool system.
//!
//! Tools are the agent's interface to the record store and the light
//! generative tier. Each tool declares a JSON schema that the registry
//! enforces before execution.

pub mod builtin;
pub mod schema;

mod registry;
mod tool;

pub use registry::ToolRegistry;
pub use tool::{Tool, ToolContext, ToolError, ToolOutput, parse_params};
