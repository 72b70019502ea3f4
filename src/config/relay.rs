/// Relay allocator configuration.
///
/// Provider limits, join-code format and the pool of relay endpoints that
/// allocations are placed on.
use std::time::Duration;

/// Largest number of peers a single allocation may be sized for.
pub const MAX_ALLOCATION_CAPACITY: u32 = 100;

/// Capacity used when a client does not ask for one.
pub const DEFAULT_ALLOCATION_CAPACITY: u32 = 20;

/// Lifetime of an allocation (in seconds).
pub const ALLOCATION_TTL_SECS: u64 = 6 * 60 * 60;

/// How long (in seconds) an expired join code keeps answering `Expired`.
pub const EXPIRED_CODE_RETENTION_SECS: u64 = 10 * 60;

/// Length of a generated join code.
pub const JOIN_CODE_LEN: usize = 6;

/// Characters a join code is drawn from. No 0/O or 1/I to keep codes readable.
pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Attempts at drawing a join code that no live allocation uses.
pub const JOIN_CODE_MAX_ATTEMPTS: u32 = 16;

/// Size (in bytes) of the symmetric key handed to each peer.
pub const KEY_LEN: usize = 32;

/// Size (in bytes) of a connection-data blob.
pub const CONNECTION_DATA_LEN: usize = 16;

/// Default relay endpoint pool: (address, port, max live allocations).
pub const DEFAULT_ENDPOINTS: &[(&str, u16, usize)] = &[("127.0.0.1", 7777, 256)];

/// A relay server allocations can be placed on.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub address: String,
    pub port: u16,
    pub max_allocations: usize,
}

/// Runtime relay settings. Defaults come from the constants above.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub max_capacity: u32,
    pub ttl: Duration,
    pub expired_code_retention: Duration,
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_capacity: MAX_ALLOCATION_CAPACITY,
            ttl: Duration::from_secs(ALLOCATION_TTL_SECS),
            expired_code_retention: Duration::from_secs(EXPIRED_CODE_RETENTION_SECS),
            endpoints: DEFAULT_ENDPOINTS
                .iter()
                .map(|(address, port, max_allocations)| EndpointConfig {
                    address: address.to_string(),
                    port: *port,
                    max_allocations: *max_allocations,
                })
                .collect(),
        }
    }
}
