//! MCP stdio server exposing the query path as tools.
pub mod server;
pub mod tools;

pub use server::{McpContext, McpServer};
