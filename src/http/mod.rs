//! HTTP Transport layer for the Model Context Protocol
//!
//! Provides the external API routing: the `/sse` event stream, the `/messages`
//! call endpoint, and the health/discovery endpoints.

pub mod handlers;
