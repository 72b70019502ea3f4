//! Request bodies accepted by the matchmaking endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::matchmaking::DEFAULT_MIN_CAPACITY;
use crate::config::relay::DEFAULT_ALLOCATION_CAPACITY;
use crate::server::directory::types::{FilterField, FilterOp, NewSession, SessionFilter, Visibility};

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct QuickJoinRequest {
    #[serde(default)]
    pub filters: Vec<SessionFilter>,
}

/// Parameters of a session created by the fallback path.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Default for CreateRequest {
    fn default() -> Self {
        Self {
            name: None,
            capacity: default_capacity(),
            visibility: Visibility::Public,
            metadata: BTreeMap::new(),
        }
    }
}

impl CreateRequest {
    pub fn into_new_session(self) -> NewSession {
        NewSession {
            name: self.name,
            capacity: self.capacity,
            visibility: self.visibility,
            metadata: self.metadata,
            allocation: None,
        }
    }
}

/// Quick-join with a fallback create. Without filters, looks for sessions
/// sized for at least the default capacity.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct JoinOrCreateRequest {
    #[serde(default)]
    pub filters: Option<Vec<SessionFilter>>,
    #[serde(default)]
    pub create: CreateRequest,
}

impl JoinOrCreateRequest {
    pub fn effective_filters(&self) -> Vec<SessionFilter> {
        match &self.filters {
            Some(filters) => filters.clone(),
            None => vec![SessionFilter::new(
                FilterField::Capacity,
                FilterOp::Ge,
                DEFAULT_MIN_CAPACITY.to_string(),
            )],
        }
    }
}

fn default_capacity() -> u32 {
    DEFAULT_ALLOCATION_CAPACITY
}
