/// Session directory actor.
///
/// Owns the `SessionDirectory` and serialises every read and mutation through
/// its mailbox. Two concurrent `ReserveSlot` messages for the last free slot
/// are handled one after the other, so exactly one of them succeeds.

use actix::prelude::*;
use std::time::{Duration, Instant};

use super::store::{HeartbeatStatus, Reservation, SessionDirectory, SessionQuery};
use super::types::{NewSession, Session, SessionFilter, SessionSummary};
use crate::server::errors::DirectoryError;
use crate::server::types::{AllocationId, PlayerId, SessionId};

/// Directory actor wrapping the in-memory store.
pub struct DirectoryServer {
    directory: SessionDirectory,
}

impl DirectoryServer {
    /// Create a directory expiring sessions silent for longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            directory: SessionDirectory::new(timeout),
        }
    }
}

impl Actor for DirectoryServer {
    type Context = Context<Self>;
}

/// Message: advertise a new session hosted by `host`.
#[derive(Message)]
#[rtype(result = "Result<SessionSummary, DirectoryError>")]
pub struct CreateSession {
    pub params: NewSession,
    pub host: PlayerId,
}

/// Message: list live public sessions matching all filters.
#[derive(Message)]
#[rtype(result = "SessionQuery")]
pub struct QuerySessions {
    pub filters: Vec<SessionFilter>,
}

/// Message: atomically take a slot for `player`.
#[derive(Message)]
#[rtype(result = "Result<Reservation, DirectoryError>")]
pub struct ReserveSlot {
    pub session_id: SessionId,
    pub player: PlayerId,
}

/// Message: give back a slot taken with `ReserveSlot`.
#[derive(Message)]
#[rtype(result = "Result<bool, DirectoryError>")]
pub struct ReleaseSlot {
    pub session_id: SessionId,
    pub player: PlayerId,
}

/// Message: remove a session. `requester: None` bypasses the host check.
#[derive(Message)]
#[rtype(result = "Result<Session, DirectoryError>")]
pub struct CloseSession {
    pub session_id: SessionId,
    pub requester: Option<PlayerId>,
}

/// Message: host liveness ping.
#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<HeartbeatStatus, DirectoryError>")]
pub struct Heartbeat {
    pub session_id: SessionId,
    pub host: PlayerId,
    pub timestamp: u64,
}

/// Message: flag a session whose relay allocation is gone.
#[derive(Message)]
#[rtype(result = "bool")]
pub struct MarkStale {
    pub session_id: SessionId,
}

/// Message: flag every session backed by one of these relay allocations.
#[derive(Message)]
#[rtype(result = "Vec<SessionId>")]
pub struct MarkStaleByAllocations {
    pub allocations: Vec<AllocationId>,
}

/// Message: relay allocations behind sessions still offered to matchmaking.
#[derive(Message)]
#[rtype(result = "Vec<AllocationId>")]
pub struct BackingAllocations;

/// Message: remove and return every session whose host stopped heartbeating.
#[derive(Message)]
#[rtype(result = "Vec<Session>")]
pub struct ExpireSessions;

/// Message: look up a single session.
#[derive(Message)]
#[rtype(result = "Option<SessionSummary>")]
pub struct GetSession {
    pub session_id: SessionId,
}

impl Handler<CreateSession> for DirectoryServer {
    type Result = Result<SessionSummary, DirectoryError>;

    fn handle(&mut self, msg: CreateSession, _ctx: &mut Self::Context) -> Self::Result {
        self.directory.create(msg.params, msg.host, Instant::now())
    }
}

impl Handler<QuerySessions> for DirectoryServer {
    type Result = MessageResult<QuerySessions>;

    fn handle(&mut self, msg: QuerySessions, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.directory.query(msg.filters, Instant::now()))
    }
}

impl Handler<ReserveSlot> for DirectoryServer {
    type Result = Result<Reservation, DirectoryError>;

    fn handle(&mut self, msg: ReserveSlot, _ctx: &mut Self::Context) -> Self::Result {
        self.directory.reserve_slot(msg.session_id, &msg.player, Instant::now())
    }
}

impl Handler<ReleaseSlot> for DirectoryServer {
    type Result = Result<bool, DirectoryError>;

    fn handle(&mut self, msg: ReleaseSlot, _ctx: &mut Self::Context) -> Self::Result {
        self.directory.release_slot(msg.session_id, &msg.player)
    }
}

impl Handler<CloseSession> for DirectoryServer {
    type Result = MessageResult<CloseSession>;

    fn handle(&mut self, msg: CloseSession, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.directory.close(msg.session_id, msg.requester.as_deref()))
    }
}

impl Handler<Heartbeat> for DirectoryServer {
    type Result = Result<HeartbeatStatus, DirectoryError>;

    fn handle(&mut self, msg: Heartbeat, _ctx: &mut Self::Context) -> Self::Result {
        self.directory
            .heartbeat(msg.session_id, &msg.host, msg.timestamp, Instant::now())
    }
}

impl Handler<MarkStale> for DirectoryServer {
    type Result = bool;

    fn handle(&mut self, msg: MarkStale, _ctx: &mut Self::Context) -> Self::Result {
        self.directory.mark_stale(msg.session_id)
    }
}

impl Handler<MarkStaleByAllocations> for DirectoryServer {
    type Result = MessageResult<MarkStaleByAllocations>;

    fn handle(&mut self, msg: MarkStaleByAllocations, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.directory.mark_stale_by_allocations(&msg.allocations))
    }
}

impl Handler<BackingAllocations> for DirectoryServer {
    type Result = MessageResult<BackingAllocations>;

    fn handle(&mut self, _msg: BackingAllocations, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.directory.backing_allocations())
    }
}

impl Handler<ExpireSessions> for DirectoryServer {
    type Result = MessageResult<ExpireSessions>;

    fn handle(&mut self, _msg: ExpireSessions, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.directory.expire(Instant::now()))
    }
}

impl Handler<GetSession> for DirectoryServer {
    type Result = Option<SessionSummary>;

    fn handle(&mut self, msg: GetSession, _ctx: &mut Self::Context) -> Self::Result {
        self.directory.get(&msg.session_id).map(Session::summary)
    }
}
