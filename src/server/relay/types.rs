//! Relay allocation data model.

use serde::{Deserialize, Serialize};

use crate::server::types::{AllocationId, JoinCode};

/// Address of a relay server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndpoint {
    pub address: String,
    pub port: u16,
}

/// Credentials one peer presents to the relay server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayCredentials {
    pub allocation_id: AllocationId,
    #[serde(with = "hex::serde")]
    pub key: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub connection_data: Vec<u8>,
}

/// A provisioned relay allocation, as handed to its host. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayAllocation {
    pub allocation_id: AllocationId,
    pub endpoint: RelayEndpoint,
    pub capacity: u32,
    pub host: RelayCredentials,
    pub join_code: JoinCode,
    pub ttl_secs: u64,
}

/// What a joining peer needs to reach the host through the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAllocation {
    pub host_allocation_id: AllocationId,
    pub endpoint: RelayEndpoint,
    pub peer: RelayCredentials,
    #[serde(with = "hex::serde")]
    pub host_connection_data: Vec<u8>,
    pub join_code: JoinCode,
    pub expires_in_secs: u64,
}
