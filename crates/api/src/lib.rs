//! Ledger API: the streaming call layer and its HTTP/SSE/WebSocket transport.

pub mod app;
pub mod protocol;
