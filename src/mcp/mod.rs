//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides the envelope codec, the method dispatcher, and the per-session event stream.

pub mod rpc;
pub mod server;
pub mod stream;
