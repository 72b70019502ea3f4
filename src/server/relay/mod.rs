/// Relay allocator: relay endpoints, per-peer credentials, and join codes.

pub mod allocator;
pub mod http;
pub mod join_code;
pub mod server;
pub mod types;

pub use server::RelayServer;
