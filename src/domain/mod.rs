//! Tool definitions and the storage policy for rendered output
//!
//! Provides the business logic of repository rendering exposed over the MCP protocol

pub mod output;
pub mod tools;
