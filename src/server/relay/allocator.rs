//! In-memory relay allocator.
//!
//! Places allocations on a configured pool of relay endpoints, hands out short
//! join codes, and resolves codes to per-peer credentials. Like the session
//! directory it is driven by a single actor and takes `now` explicitly.
//!
//! Code lifecycle: a code is live while its allocation is live. When the TTL
//! elapses the code answers `Expired` (a tombstone is kept for a retention
//! window); when the allocation is released the code answers `NotFound`.
//! A tombstoned code may be issued again.
//!
//! Every allocation remembers the player it was issued to. Only that player
//! may claim its code for a directory listing or release it explicitly.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use super::join_code;
use super::types::{JoinAllocation, RelayAllocation, RelayCredentials, RelayEndpoint};
use crate::config::relay::{CONNECTION_DATA_LEN, JOIN_CODE_MAX_ATTEMPTS, KEY_LEN, RelaySettings};
use crate::server::errors::RelayError;
use crate::server::types::{AllocationId, JoinCode, PlayerId};

/// A live allocation and its bookkeeping.
struct Allocation {
    issued: RelayAllocation,
    owner: PlayerId,
    endpoint_index: usize,
    expires_at: Instant,
}

impl Allocation {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct RelayAllocator {
    settings: RelaySettings,
    live: HashMap<AllocationId, Allocation>,
    codes: HashMap<JoinCode, AllocationId>,
    /// Codes whose allocation timed out, with the instant it did.
    expired_codes: HashMap<JoinCode, Instant>,
    rng: StdRng,
}

impl RelayAllocator {
    pub fn new(settings: RelaySettings) -> Self {
        Self::with_rng(settings, StdRng::from_os_rng())
    }

    /// Allocator with a caller-provided random source (seeded in tests).
    pub fn with_rng(settings: RelaySettings, rng: StdRng) -> Self {
        Self {
            settings,
            live: HashMap::new(),
            codes: HashMap::new(),
            expired_codes: HashMap::new(),
            rng,
        }
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Provision an allocation for `capacity` peers on the least loaded endpoint,
    /// owned by `owner`.
    pub fn allocate(
        &mut self,
        capacity: u32,
        owner: PlayerId,
        now: Instant,
    ) -> Result<RelayAllocation, RelayError> {
        if capacity < 1 {
            return Err(RelayError::InvalidCapacity(capacity));
        }
        if capacity > self.settings.max_capacity {
            return Err(RelayError::CapacityExceeded {
                requested: capacity,
                max: self.settings.max_capacity,
            });
        }

        let endpoint_index = self.pick_endpoint(now).ok_or_else(|| {
            warn!("[Relay] All relay endpoints are saturated");
            RelayError::AllocatorUnavailable("all relay endpoints are saturated".into())
        })?;
        let join_code = self.draw_code().ok_or_else(|| {
            warn!("[Relay] Could not draw an unused join code");
            RelayError::AllocatorUnavailable("join code space exhausted".into())
        })?;

        let endpoint_config = &self.settings.endpoints[endpoint_index];
        let endpoint = RelayEndpoint {
            address: endpoint_config.address.clone(),
            port: endpoint_config.port,
        };
        let allocation_id = Uuid::new_v4();
        let issued = RelayAllocation {
            allocation_id,
            endpoint,
            capacity,
            host: self.credentials(allocation_id),
            join_code: join_code.clone(),
            ttl_secs: self.settings.ttl.as_secs(),
        };

        self.expired_codes.remove(&join_code);
        self.codes.insert(join_code.clone(), allocation_id);
        self.live.insert(
            allocation_id,
            Allocation {
                issued: issued.clone(),
                owner,
                endpoint_index,
                expires_at: now + self.settings.ttl,
            },
        );
        info!(
            "[Relay] Allocation created: id={} code={} capacity={} endpoint={}:{}",
            allocation_id, join_code, capacity, issued.endpoint.address, issued.endpoint.port
        );
        Ok(issued)
    }

    /// Resolve a join code into fresh peer credentials for the allocation.
    pub fn resolve(&mut self, code: &str, now: Instant) -> Result<JoinAllocation, RelayError> {
        let code = join_code::normalize(code);
        let Some(allocation_id) = self.codes.get(&code).copied() else {
            if self.expired_codes.contains_key(&code) {
                return Err(RelayError::Expired(code));
            }
            return Err(RelayError::NotFound(code));
        };
        let (host_allocation_id, endpoint, host_connection_data, expires_at) = match self.live.get(&allocation_id) {
            Some(allocation) if allocation.is_expired(now) => return Err(RelayError::Expired(code)),
            Some(allocation) => (
                allocation.issued.allocation_id,
                allocation.issued.endpoint.clone(),
                allocation.issued.host.connection_data.clone(),
                allocation.expires_at,
            ),
            None => return Err(RelayError::NotFound(code)),
        };

        debug!("[Relay] Join code {} resolved to allocation {}", code, host_allocation_id);
        Ok(JoinAllocation {
            host_allocation_id,
            endpoint,
            peer: self.credentials(Uuid::new_v4()),
            host_connection_data,
            join_code: code,
            expires_in_secs: expires_at.saturating_duration_since(now).as_secs(),
        })
    }

    /// Check that `code` is a live allocation owned by `owner` and return its id.
    pub fn claim(&self, code: &str, owner: &str, now: Instant) -> Result<AllocationId, RelayError> {
        let code = join_code::normalize(code);
        let Some(allocation_id) = self.codes.get(&code).copied() else {
            if self.expired_codes.contains_key(&code) {
                return Err(RelayError::Expired(code));
            }
            return Err(RelayError::NotFound(code));
        };
        match self.live.get(&allocation_id) {
            Some(allocation) if allocation.is_expired(now) => Err(RelayError::Expired(code)),
            Some(allocation) if allocation.owner != owner => {
                warn!("[Relay] Player {} tried to claim join code {} it does not own", owner, code);
                Err(RelayError::NotOwner(code))
            }
            Some(_) => Ok(allocation_id),
            None => Err(RelayError::NotFound(code)),
        }
    }

    /// Release an allocation on behalf of `requester`, which must own it.
    /// Unknown or expired ids are a no-op and return `false`.
    pub fn release_owned(&mut self, allocation_id: AllocationId, requester: &str) -> Result<bool, RelayError> {
        match self.live.get(&allocation_id) {
            Some(allocation) if allocation.owner != requester => {
                warn!(
                    "[Relay] Player {} tried to release allocation {} it does not own",
                    requester, allocation_id
                );
                Err(RelayError::NotOwner(allocation_id.to_string()))
            }
            _ => Ok(self.release(allocation_id)),
        }
    }

    /// Release an allocation. Idempotent: unknown or expired ids are a no-op.
    pub fn release(&mut self, allocation_id: AllocationId) -> bool {
        match self.live.remove(&allocation_id) {
            Some(allocation) => {
                let code = &allocation.issued.join_code;
                if self.codes.get(code) == Some(&allocation_id) {
                    self.codes.remove(code);
                }
                info!("[Relay] Allocation released: id={} code={}", allocation_id, code);
                true
            }
            None => false,
        }
    }

    /// The subset of `ids` that no longer name a usable allocation.
    pub fn dead(&self, ids: &[AllocationId], now: Instant) -> Vec<AllocationId> {
        ids.iter()
            .filter(|id| self.live.get(id).is_none_or(|a| a.is_expired(now)))
            .copied()
            .collect()
    }

    /// Drop allocations whose TTL has elapsed and prune old tombstones.
    /// Returns the join codes that expired in this sweep.
    pub fn sweep(&mut self, now: Instant) -> Vec<JoinCode> {
        let retention = self.settings.expired_code_retention;
        self.expired_codes
            .retain(|_, expired_at| now.saturating_duration_since(*expired_at) <= retention);

        let lapsed: Vec<AllocationId> = self
            .live
            .values()
            .filter(|a| a.is_expired(now))
            .map(|a| a.issued.allocation_id)
            .collect();

        let mut codes = Vec::with_capacity(lapsed.len());
        for allocation_id in lapsed {
            if let Some(allocation) = self.live.remove(&allocation_id) {
                let code = allocation.issued.join_code;
                self.codes.remove(&code);
                info!("[Relay] Allocation expired: id={} code={}", allocation_id, code);
                self.expired_codes.insert(code.clone(), allocation.expires_at);
                codes.push(code);
            }
        }
        codes
    }

    fn pick_endpoint(&self, now: Instant) -> Option<usize> {
        let mut load = vec![0usize; self.settings.endpoints.len()];
        for allocation in self.live.values().filter(|a| !a.is_expired(now)) {
            load[allocation.endpoint_index] += 1;
        }
        self.settings
            .endpoints
            .iter()
            .enumerate()
            .filter(|(i, endpoint)| load[*i] < endpoint.max_allocations)
            .min_by_key(|(i, _)| load[*i])
            .map(|(i, _)| i)
    }

    fn draw_code(&mut self) -> Option<JoinCode> {
        for _ in 0..JOIN_CODE_MAX_ATTEMPTS {
            let code = join_code::generate(&mut self.rng);
            if !self.codes.contains_key(&code) {
                return Some(code);
            }
        }
        None
    }

    fn credentials(&mut self, allocation_id: AllocationId) -> RelayCredentials {
        let mut key = vec![0u8; KEY_LEN];
        let mut connection_data = vec![0u8; CONNECTION_DATA_LEN];
        self.rng.fill(key.as_mut_slice());
        self.rng.fill(connection_data.as_mut_slice());
        RelayCredentials {
            allocation_id,
            key,
            connection_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::relay::EndpointConfig;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(60);

    fn settings(endpoints: &[usize]) -> RelaySettings {
        RelaySettings {
            max_capacity: 100,
            ttl: TTL,
            expired_code_retention: Duration::from_secs(30),
            endpoints: endpoints
                .iter()
                .enumerate()
                .map(|(i, max)| EndpointConfig {
                    address: format!("10.0.0.{}", i + 1),
                    port: 7777,
                    max_allocations: *max,
                })
                .collect(),
        }
    }

    fn allocator(endpoints: &[usize]) -> RelayAllocator {
        RelayAllocator::with_rng(settings(endpoints), StdRng::seed_from_u64(42))
    }

    #[test]
    fn allocate_then_resolve_round_trip() {
        let mut relay = allocator(&[8]);
        let now = Instant::now();
        let allocation = relay.allocate(20, "host".into(), now).unwrap();
        assert_eq!(allocation.capacity, 20);
        assert_eq!(allocation.host.key.len(), KEY_LEN);

        let joined = relay.resolve(&allocation.join_code.to_lowercase(), now).unwrap();
        assert_eq!(joined.host_allocation_id, allocation.allocation_id);
        assert_eq!(joined.endpoint, allocation.endpoint);
        assert_eq!(joined.host_connection_data, allocation.host.connection_data);
        assert_eq!(joined.join_code, allocation.join_code);
        assert_ne!(joined.peer.allocation_id, allocation.allocation_id);
        assert_eq!(joined.expires_in_secs, 60);
    }

    #[test]
    fn capacity_limits() {
        let mut relay = allocator(&[8]);
        let now = Instant::now();
        assert_eq!(relay.allocate(0, "host".into(), now), Err(RelayError::InvalidCapacity(0)));
        assert_eq!(
            relay.allocate(101, "host".into(), now),
            Err(RelayError::CapacityExceeded { requested: 101, max: 100 })
        );
        assert!(relay.allocate(100, "host".into(), now).is_ok());
    }

    #[test]
    fn saturated_pool_is_unavailable() {
        let mut relay = allocator(&[1, 1]);
        let now = Instant::now();
        let a = relay.allocate(4, "host".into(), now).unwrap();
        let b = relay.allocate(4, "host".into(), now).unwrap();
        assert_ne!(a.endpoint, b.endpoint, "spread across endpoints");
        assert!(matches!(relay.allocate(4, "host".into(), now), Err(RelayError::AllocatorUnavailable(_))));

        relay.release(a.allocation_id);
        assert!(relay.allocate(4, "host".into(), now).is_ok());
    }

    #[test]
    fn released_code_is_not_found() {
        let mut relay = allocator(&[8]);
        let now = Instant::now();
        let allocation = relay.allocate(4, "host".into(), now).unwrap();
        assert!(relay.release(allocation.allocation_id));
        assert!(!relay.release(allocation.allocation_id), "release is idempotent");
        assert_eq!(
            relay.resolve(&allocation.join_code, now),
            Err(RelayError::NotFound(allocation.join_code.clone()))
        );
    }

    #[test]
    fn expired_code_answers_expired_until_pruned() {
        let mut relay = allocator(&[8]);
        let t0 = Instant::now();
        let allocation = relay.allocate(4, "host".into(), t0).unwrap();
        let code = allocation.join_code.clone();

        let t1 = t0 + TTL;
        assert_eq!(relay.resolve(&code, t1), Err(RelayError::Expired(code.clone())));

        assert_eq!(relay.sweep(t1), vec![code.clone()]);
        assert_eq!(relay.live_count(), 0);
        assert_eq!(relay.resolve(&code, t1), Err(RelayError::Expired(code.clone())));
        assert!(!relay.release(allocation.allocation_id));

        let t2 = t1 + Duration::from_secs(31);
        assert!(relay.sweep(t2).is_empty());
        assert_eq!(relay.resolve(&code, t2), Err(RelayError::NotFound(code)));
    }

    #[test]
    fn live_codes_are_unique() {
        let mut relay = allocator(&[512]);
        let now = Instant::now();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..300 {
            let allocation = relay.allocate(2, "host".into(), now).unwrap();
            assert!(seen.insert(allocation.join_code));
        }
    }

    #[test]
    fn only_the_owner_claims_a_code() {
        let mut relay = allocator(&[8]);
        let now = Instant::now();
        let allocation = relay.allocate(4, "alice".into(), now).unwrap();
        let code = allocation.join_code.clone();

        assert_eq!(relay.claim(&code.to_lowercase(), "alice", now), Ok(allocation.allocation_id));
        assert_eq!(relay.claim(&code, "mallory", now), Err(RelayError::NotOwner(code.clone())));
        assert_eq!(relay.claim("ZZZZZZ", "alice", now), Err(RelayError::NotFound("ZZZZZZ".into())));
        assert_eq!(relay.claim(&code, "alice", now + TTL), Err(RelayError::Expired(code)));
    }

    #[test]
    fn only_the_owner_releases() {
        let mut relay = allocator(&[8]);
        let now = Instant::now();
        let allocation = relay.allocate(4, "alice".into(), now).unwrap();

        assert_eq!(
            relay.release_owned(allocation.allocation_id, "mallory"),
            Err(RelayError::NotOwner(allocation.allocation_id.to_string()))
        );
        assert!(relay.resolve(&allocation.join_code, now).is_ok(), "still live");

        assert_eq!(relay.release_owned(allocation.allocation_id, "alice"), Ok(true));
        assert_eq!(relay.release_owned(allocation.allocation_id, "mallory"), Ok(false));
        assert_eq!(relay.live_count(), 0);
    }

    #[test]
    fn dead_lists_released_and_lapsed_allocations() {
        let mut relay = allocator(&[8]);
        let t0 = Instant::now();
        let kept = relay.allocate(4, "a".into(), t0).unwrap().allocation_id;
        let released = relay.allocate(4, "b".into(), t0).unwrap().allocation_id;
        let unknown = Uuid::new_v4();
        relay.release(released);

        assert_eq!(relay.dead(&[kept, released, unknown], t0), vec![released, unknown]);
        assert_eq!(relay.dead(&[kept], t0 + TTL), vec![kept]);
    }
}
