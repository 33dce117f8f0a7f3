//! HTTP transport for provider pools.
//!
//! [`HttpEndpoint`] speaks both plain REST (Esplora-style backends) and
//! JSON-RPC 2.0 (EVM nodes) over `reqwest`, with optional basic auth and a
//! per-endpoint request rate limit. It is also where transport failures are
//! classified into network and application errors.

mod client;
mod connection;
mod protocol;

pub use client::HttpEndpoint;
pub use protocol::classify_status;
