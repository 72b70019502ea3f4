//! Server layer root module.
//!
//! - Session directory, relay allocator and matchmaker actors
//! - Heartbeat watchdog, host-side heartbeat driver and host WebSocket channel
//! - Identity, application state and HTTP/WebSocket routing

pub mod anti_spam;
pub mod auth;
pub mod directory;
pub mod errors;
pub mod heartbeat;
pub mod matchmaking;
pub mod relay;
pub mod router;
pub mod state;
pub mod types;
pub mod ws_actor_utils;
