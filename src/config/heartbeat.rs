/// Heartbeat configuration.
///
/// Hosts ping every `HEARTBEAT_INTERVAL_SECS`; a session whose host has been
/// silent for longer than `HEARTBEAT_TIMEOUT_SECS` is expired by the watchdog.
use std::time::Duration;

/// Interval (in seconds) between two heartbeats sent by a session host.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// Silence (in seconds) after which a session is expired. Twice the interval.
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 2 * HEARTBEAT_INTERVAL_SECS;

/// Interval (in seconds) between two watchdog sweeps.
pub const SWEEP_INTERVAL_SECS: u64 = 5;

/// How many times per heartbeat interval the host driver samples its clock.
pub const HOST_TICKS_PER_INTERVAL: u32 = 3;

/// Runtime heartbeat settings. Defaults come from the constants above.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            timeout: Duration::from_secs(HEARTBEAT_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
        }
    }
}

impl HeartbeatSettings {
    /// Settings for a given host interval, with the timeout at twice the interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            timeout: interval * 2,
            sweep_interval: interval / 3,
        }
    }
}
