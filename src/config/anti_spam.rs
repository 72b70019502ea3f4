/// Flood limits for the host WebSocket channel.
/// All values are in seconds or counts per second.
/// Every request is answered, so the two budgets match.
pub const MAX_RESPONSES_PER_SECOND: u32 = 30;
pub const MAX_REQUESTS_PER_SECOND: u32 = 30;
pub const BAN_DURATION_SECONDS: u64 = 300;
