/// Session liveness: the directory-side watchdog, the host-side heartbeat
/// driver and the WebSocket channel hosts heartbeat through.

pub mod host;
pub mod messages;
pub mod monitor;
pub mod session;

pub use host::HostHeartbeat;
pub use monitor::HeartbeatMonitor;
