//! Rendezvous backend for multiplayer sessions.
//!
//! A session directory, a relay allocator handing out join codes, a quick-join
//! matchmaker over both, and the heartbeat watchdog that keeps the directory
//! honest. Each component is an actix actor; `server::router::config` exposes
//! them over HTTP and WebSocket. The binary in `main.rs` wires them together.

pub mod config;
pub mod server;
