/// Matchmaking: quick-join, create-new and the join state machine.

pub mod http;
pub mod messages;
pub mod server;
pub mod types;

pub use server::Matchmaker;
