/// Main configuration module.
/// 
/// Re-exports submodules for the session directory, relay allocator, heartbeat
/// monitoring, matchmaking and anti-spam configuration.
pub mod anti_spam;
pub mod directory;
pub mod heartbeat;
pub mod matchmaking;
pub mod relay;
