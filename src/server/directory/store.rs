//! In-memory session directory.
//!
//! `SessionDirectory` holds every advertised session and implements the
//! directory contract (create, query, reserve, release, close, heartbeat,
//! expire). It has no internal locking: the `DirectoryServer` actor owns it and
//! applies messages one at a time, which is what makes `reserve_slot` a single
//! atomic check-and-increment. Time is always passed in, never read here.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, info};
use uuid::Uuid;

use super::types::{NewSession, Session, SessionFilter, SessionSummary, Visibility};
use crate::config::directory::{
    DEFAULT_SESSION_NAME, JOIN_CODE_KEY, MAX_METADATA_ENTRIES, MAX_SESSION_NAME_LEN,
};
use crate::server::errors::DirectoryError;
use crate::server::types::{AllocationId, PlayerId, SessionId};

/// Result of a successful slot reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub session: SessionSummary,
    /// The player already held a slot; occupancy was not changed.
    pub already_member: bool,
}

/// Whether a heartbeat moved the session's liveness clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HeartbeatStatus {
    Refreshed,
    /// Timestamp not newer than the last accepted one; the clock was left alone.
    OutOfOrder,
}

/// Lazy, restartable view over a directory snapshot, newest session first.
///
/// The snapshot is taken when the query is issued; filters are applied as the
/// cursor advances. Cloning the cursor or calling `restart` replays it.
#[derive(Debug, Clone)]
pub struct SessionQuery {
    snapshot: Arc<[SessionSummary]>,
    filters: Arc<[SessionFilter]>,
    position: usize,
}

impl SessionQuery {
    fn new(snapshot: Vec<SessionSummary>, filters: Vec<SessionFilter>) -> Self {
        Self {
            snapshot: snapshot.into(),
            filters: filters.into(),
            position: 0,
        }
    }

    pub fn restart(&mut self) {
        self.position = 0;
    }
}

impl Iterator for SessionQuery {
    type Item = SessionSummary;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(candidate) = self.snapshot.get(self.position) {
            self.position += 1;
            if self.filters.iter().all(|filter| filter.matches(candidate)) {
                return Some(candidate.clone());
            }
        }
        None
    }
}

pub struct SessionDirectory {
    sessions: HashMap<SessionId, Session>,
    next_seq: u64,
    timeout: Duration,
}

impl SessionDirectory {
    /// Create an empty directory expiring sessions silent for longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            next_seq: 0,
            timeout,
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Advertise a new session. The host occupies the first slot.
    ///
    /// A join code may only be advertised together with the allocation it was
    /// claimed from.
    pub fn create(
        &mut self,
        params: NewSession,
        host: PlayerId,
        now: Instant,
    ) -> Result<SessionSummary, DirectoryError> {
        if params.capacity < 1 {
            return Err(DirectoryError::InvalidCapacity(params.capacity));
        }
        let name = match params.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => DEFAULT_SESSION_NAME.to_string(),
        };
        if name.len() > MAX_SESSION_NAME_LEN {
            return Err(DirectoryError::InvalidSession(format!(
                "name longer than {MAX_SESSION_NAME_LEN} bytes"
            )));
        }
        if params.metadata.len() > MAX_METADATA_ENTRIES {
            return Err(DirectoryError::InvalidSession(format!(
                "more than {MAX_METADATA_ENTRIES} metadata entries"
            )));
        }
        if params.metadata.contains_key(JOIN_CODE_KEY) && params.allocation.is_none() {
            return Err(DirectoryError::InvalidSession(
                "join code advertised without a claimed relay allocation".into(),
            ));
        }

        self.next_seq += 1;
        let session = Session {
            id: Uuid::new_v4(),
            name,
            capacity: params.capacity,
            visibility: params.visibility,
            host: host.clone(),
            metadata: params.metadata,
            allocation: params.allocation,
            members: BTreeSet::from([host]),
            created_at_ms: unix_millis(),
            created_seq: self.next_seq,
            last_heartbeat: now,
            last_heartbeat_stamp: None,
            stale: false,
        };
        let summary = session.summary();
        info!(
            "[Directory] Session created: id={} name={:?} capacity={} host={}",
            session.id, session.name, session.capacity, session.host
        );
        self.sessions.insert(session.id, session);
        Ok(summary)
    }

    /// Snapshot of live public sessions matching all `filters`, newest first.
    ///
    /// Private, stale, and heartbeat-expired sessions are never listed, even
    /// before the watchdog has swept them.
    pub fn query(&self, filters: Vec<SessionFilter>, now: Instant) -> SessionQuery {
        let mut live: Vec<&Session> = self
            .sessions
            .values()
            .filter(|s| s.visibility == Visibility::Public)
            .filter(|s| !s.stale && !s.is_expired(now, self.timeout))
            .collect();
        live.sort_by(|a, b| b.created_seq.cmp(&a.created_seq));
        SessionQuery::new(live.into_iter().map(Session::summary).collect(), filters)
    }

    /// Take one slot for `player` if, and only if, occupancy is below capacity.
    pub fn reserve_slot(
        &mut self,
        id: SessionId,
        player: &str,
        now: Instant,
    ) -> Result<Reservation, DirectoryError> {
        let timeout = self.timeout;
        let session = self
            .sessions
            .get_mut(&id)
            .filter(|s| !s.stale && !s.is_expired(now, timeout))
            .ok_or(DirectoryError::NotFound(id))?;

        if session.members.contains(player) {
            return Ok(Reservation {
                session: session.summary(),
                already_member: true,
            });
        }
        if session.occupancy() >= session.capacity {
            debug!("[Directory] Reservation refused, session {} is full", id);
            return Err(DirectoryError::Full(id));
        }
        session.members.insert(player.to_string());
        debug!(
            "[Directory] Slot reserved: session={} player={} occupancy={}/{}",
            id,
            player,
            session.occupancy(),
            session.capacity
        );
        Ok(Reservation {
            session: session.summary(),
            already_member: false,
        })
    }

    /// Give back `player`'s slot. Returns false when the player held none.
    /// The host's slot is only released by closing the session.
    pub fn release_slot(&mut self, id: SessionId, player: &str) -> Result<bool, DirectoryError> {
        let session = self.sessions.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        if session.host == player {
            return Ok(false);
        }
        let released = session.members.remove(player);
        if released {
            debug!("[Directory] Slot released: session={} player={}", id, player);
        }
        Ok(released)
    }

    /// Remove a session. With a `requester`, only the host may close it.
    pub fn close(&mut self, id: SessionId, requester: Option<&str>) -> Result<Session, DirectoryError> {
        let session = self.sessions.get(&id).ok_or(DirectoryError::NotFound(id))?;
        if let Some(requester) = requester {
            if session.host != requester {
                return Err(DirectoryError::NotHost(id));
            }
        }
        let session = self.sessions.remove(&id).ok_or(DirectoryError::NotFound(id))?;
        info!("[Directory] Session closed: id={}", id);
        Ok(session)
    }

    /// Reset the liveness clock unconditionally.
    pub fn touch_heartbeat(&mut self, id: SessionId, now: Instant) -> Result<(), DirectoryError> {
        let session = self.sessions.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        if now > session.last_heartbeat {
            session.last_heartbeat = now;
        }
        Ok(())
    }

    /// Host heartbeat. Timestamps must increase; an older or repeated one is
    /// acknowledged without touching the liveness clock.
    pub fn heartbeat(
        &mut self,
        id: SessionId,
        host: &str,
        timestamp: u64,
        now: Instant,
    ) -> Result<HeartbeatStatus, DirectoryError> {
        let session = self.sessions.get(&id).ok_or(DirectoryError::NotFound(id))?;
        if session.host != host {
            return Err(DirectoryError::NotHost(id));
        }
        if session.last_heartbeat_stamp.is_some_and(|last| timestamp <= last) {
            debug!(
                "[Directory] Out-of-order heartbeat ignored: session={} timestamp={}",
                id, timestamp
            );
            return Ok(HeartbeatStatus::OutOfOrder);
        }
        self.touch_heartbeat(id, now)?;
        if let Some(session) = self.sessions.get_mut(&id) {
            session.last_heartbeat_stamp = Some(timestamp);
        }
        Ok(HeartbeatStatus::Refreshed)
    }

    /// Exclude a session from matchmaking. Returns false if it does not exist.
    pub fn mark_stale(&mut self, id: SessionId) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                if !session.stale {
                    info!("[Directory] Session {} marked stale", id);
                }
                session.stale = true;
                true
            }
            None => false,
        }
    }

    /// Allocations backing sessions that are still offered to matchmaking.
    pub fn backing_allocations(&self) -> Vec<AllocationId> {
        self.sessions
            .values()
            .filter(|s| !s.stale)
            .filter_map(|s| s.allocation)
            .collect()
    }

    /// Mark every session backed by one of `allocations` as stale.
    pub fn mark_stale_by_allocations(&mut self, allocations: &[AllocationId]) -> Vec<SessionId> {
        let ids: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| !s.stale)
            .filter(|s| s.allocation.is_some_and(|a| allocations.contains(&a)))
            .map(|s| s.id)
            .collect();
        for id in &ids {
            self.mark_stale(*id);
        }
        ids
    }

    /// Remove and return every session whose host has been silent too long.
    pub fn expire(&mut self, now: Instant) -> Vec<Session> {
        let timeout = self.timeout;
        let expired: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.is_expired(now, timeout))
            .map(|s| s.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.sessions.remove(&id))
            .inspect(|s| info!("[Directory] Session expired: id={} host={}", s.id, s.host))
            .collect()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::directory::types::{FilterField, FilterOp};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn params(capacity: u32) -> NewSession {
        NewSession {
            name: Some("test".into()),
            capacity,
            visibility: Visibility::Public,
            metadata: BTreeMap::new(),
            allocation: None,
        }
    }

    fn with_code(capacity: u32, code: &str, allocation: AllocationId) -> NewSession {
        let mut p = params(capacity);
        p.metadata.insert(JOIN_CODE_KEY.into(), code.into());
        p.allocation = Some(allocation);
        p
    }

    #[test]
    fn create_rejects_zero_capacity() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let err = dir.create(params(0), "host".into(), Instant::now()).unwrap_err();
        assert_eq!(err, DirectoryError::InvalidCapacity(0));
        assert!(dir.is_empty());
    }

    #[test]
    fn create_defaults_name_and_counts_host() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let mut p = params(4);
        p.name = None;
        let s = dir.create(p, "host".into(), Instant::now()).unwrap();
        assert_eq!(s.name, DEFAULT_SESSION_NAME);
        assert_eq!(s.occupancy, 1);
        assert_eq!(s.available_slots, 3);
    }

    #[test]
    fn create_rejects_oversized_sessions() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let mut p = params(4);
        p.name = Some("x".repeat(MAX_SESSION_NAME_LEN + 1));
        assert!(matches!(
            dir.create(p, "host".into(), Instant::now()),
            Err(DirectoryError::InvalidSession(_))
        ));
    }

    #[test]
    fn query_is_newest_first_and_filtered() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let now = Instant::now();
        let small = dir.create(params(4), "a".into(), now).unwrap();
        let big = dir.create(params(20), "b".into(), now).unwrap();
        let bigger = dir.create(params(30), "c".into(), now).unwrap();

        let all: Vec<_> = dir.query(vec![], now).map(|s| s.id).collect();
        assert_eq!(all, vec![bigger.id, big.id, small.id]);

        let filters = vec![SessionFilter::new(FilterField::Capacity, FilterOp::Ge, "10")];
        let large: Vec<_> = dir.query(filters, now).map(|s| s.id).collect();
        assert_eq!(large, vec![bigger.id, big.id]);
    }

    #[test]
    fn query_is_restartable() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let now = Instant::now();
        dir.create(params(4), "a".into(), now).unwrap();
        dir.create(params(4), "b".into(), now).unwrap();

        let mut cursor = dir.query(vec![], now);
        let replay = cursor.clone();
        assert_eq!(cursor.by_ref().count(), 2);
        assert_eq!(cursor.next(), None);
        cursor.restart();
        assert_eq!(cursor.count(), 2);
        assert_eq!(replay.count(), 2);
    }

    #[test]
    fn query_hides_private_stale_and_expired() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let now = Instant::now();
        let mut private = params(4);
        private.visibility = Visibility::Private;
        dir.create(private, "a".into(), now).unwrap();
        let stale = dir.create(params(4), "b".into(), now).unwrap();
        dir.mark_stale(stale.id);
        let old = dir.create(params(4), "c".into(), now).unwrap();
        let fresh = dir.create(params(4), "d".into(), now).unwrap();

        let later = now + TIMEOUT + Duration::from_secs(1);
        dir.touch_heartbeat(fresh.id, later).unwrap();
        let listed: Vec<_> = dir.query(vec![], later).map(|s| s.id).collect();
        assert_eq!(listed, vec![fresh.id]);
        assert!(dir.get(&old.id).is_some(), "not swept yet, only hidden");
    }

    #[test]
    fn reserve_until_full() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let now = Instant::now();
        let s = dir.create(params(3), "host".into(), now).unwrap();

        assert!(dir.reserve_slot(s.id, "p1", now).is_ok());
        let r = dir.reserve_slot(s.id, "p2", now).unwrap();
        assert_eq!(r.session.occupancy, 3);
        assert_eq!(dir.reserve_slot(s.id, "p3", now), Err(DirectoryError::Full(s.id)));

        // Re-reserving is idempotent and does not consume a slot.
        let again = dir.reserve_slot(s.id, "p1", now).unwrap();
        assert!(again.already_member);
        assert_eq!(again.session.occupancy, 3);
    }

    #[test]
    fn reserve_unknown_or_stale_is_not_found() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let now = Instant::now();
        let missing = Uuid::new_v4();
        assert_eq!(dir.reserve_slot(missing, "p", now), Err(DirectoryError::NotFound(missing)));

        let s = dir.create(params(3), "host".into(), now).unwrap();
        dir.mark_stale(s.id);
        assert_eq!(dir.reserve_slot(s.id, "p", now), Err(DirectoryError::NotFound(s.id)));
    }

    #[test]
    fn release_frees_a_slot_but_not_the_host() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let now = Instant::now();
        let s = dir.create(params(2), "host".into(), now).unwrap();
        dir.reserve_slot(s.id, "p1", now).unwrap();
        assert!(dir.reserve_slot(s.id, "p2", now).is_err());

        assert_eq!(dir.release_slot(s.id, "p1"), Ok(true));
        assert_eq!(dir.release_slot(s.id, "p1"), Ok(false));
        assert_eq!(dir.release_slot(s.id, "host"), Ok(false));
        assert!(dir.reserve_slot(s.id, "p2", now).is_ok());
    }

    #[test]
    fn close_is_host_only() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let s = dir.create(params(2), "host".into(), Instant::now()).unwrap();
        assert_eq!(dir.close(s.id, Some("intruder")).unwrap_err(), DirectoryError::NotHost(s.id));
        assert!(dir.close(s.id, Some("host")).is_ok());
        assert_eq!(dir.close(s.id, None).unwrap_err(), DirectoryError::NotFound(s.id));
    }

    #[test]
    fn heartbeat_checks_host_and_ordering() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let t0 = Instant::now();
        let s = dir.create(params(2), "host".into(), t0).unwrap();

        assert_eq!(dir.heartbeat(s.id, "other", 1, t0), Err(DirectoryError::NotHost(s.id)));

        let t1 = t0 + Duration::from_secs(10);
        assert_eq!(dir.heartbeat(s.id, "host", 5, t1), Ok(HeartbeatStatus::Refreshed));
        assert_eq!(dir.get(&s.id).unwrap().last_heartbeat, t1);

        // An older heartbeat arriving late must not move the clock.
        let t2 = t0 + Duration::from_secs(20);
        assert_eq!(dir.heartbeat(s.id, "host", 4, t2), Ok(HeartbeatStatus::OutOfOrder));
        assert_eq!(dir.get(&s.id).unwrap().last_heartbeat, t1);

        let missing = Uuid::new_v4();
        assert_eq!(dir.heartbeat(missing, "host", 9, t2), Err(DirectoryError::NotFound(missing)));
    }

    #[test]
    fn expire_removes_only_silent_sessions() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let t0 = Instant::now();
        let quiet = dir.create(params(2), "a".into(), t0).unwrap();
        let alive = dir.create(params(2), "b".into(), t0).unwrap();

        // Exactly at the timeout the session is still alive.
        assert!(dir.expire(t0 + TIMEOUT).is_empty());

        let t1 = t0 + Duration::from_secs(20);
        dir.heartbeat(alive.id, "b", 1, t1).unwrap();
        let expired = dir.expire(t0 + TIMEOUT + Duration::from_millis(1));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, quiet.id);
        assert!(dir.get(&quiet.id).is_none());
        assert!(dir.get(&alive.id).is_some());
    }

    #[test]
    fn join_code_requires_an_allocation() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let mut p = params(4);
        p.metadata.insert(JOIN_CODE_KEY.into(), "ABC123".into());
        assert!(matches!(
            dir.create(p, "host".into(), Instant::now()),
            Err(DirectoryError::InvalidSession(_))
        ));
        assert!(dir.is_empty());
    }

    #[test]
    fn stale_by_allocation() {
        let mut dir = SessionDirectory::new(TIMEOUT);
        let now = Instant::now();
        let (gone, kept) = (Uuid::new_v4(), Uuid::new_v4());
        let a = dir.create(with_code(4, "ABC123", gone), "a".into(), now).unwrap();
        dir.create(with_code(4, "XYZ789", kept), "b".into(), now).unwrap();
        dir.create(params(4), "c".into(), now).unwrap();
        assert_eq!(a.allocation_id, Some(gone));

        let mut backing = dir.backing_allocations();
        backing.sort();
        let mut expected = vec![gone, kept];
        expected.sort();
        assert_eq!(backing, expected);

        let marked = dir.mark_stale_by_allocations(&[gone]);
        assert_eq!(marked, vec![a.id]);
        assert_eq!(dir.query(vec![], now).count(), 2);
        assert_eq!(dir.backing_allocations(), vec![kept]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(u8),
        Release(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..12).prop_map(Op::Reserve),
            (0u8..12).prop_map(Op::Release),
        ]
    }

    proptest! {
        #[test]
        fn occupancy_never_exceeds_capacity(capacity in 1u32..8, ops in prop::collection::vec(op(), 0..64)) {
            let mut dir = SessionDirectory::new(TIMEOUT);
            let now = Instant::now();
            let s = dir.create(params(capacity), "host".into(), now).unwrap();
            for op in ops {
                match op {
                    Op::Reserve(p) => { let _ = dir.reserve_slot(s.id, &format!("p{p}"), now); }
                    Op::Release(p) => { let _ = dir.release_slot(s.id, &format!("p{p}")); }
                }
                let session = dir.get(&s.id).unwrap();
                prop_assert!(session.occupancy() <= capacity);
                prop_assert!(session.members.contains("host"));
            }
        }
    }
}
