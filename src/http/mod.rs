//! HTTP surface for the SSE transport
//!
//! Routes for opening event streams and posting client messages, plus a health probe.

pub mod handlers;
pub mod sse;

pub use sse::SseTransport;
