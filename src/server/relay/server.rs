/// Relay allocator actor.
///
/// Serialises `allocate`, `resolve`, `release` and TTL sweeps through one
/// mailbox, so a join code can never be handed to two live allocations and a
/// resolve never observes a half-released allocation.

use actix::prelude::*;
use std::time::Instant;

use super::allocator::RelayAllocator;
use super::types::{JoinAllocation, RelayAllocation};
use crate::config::relay::RelaySettings;
use crate::server::errors::RelayError;
use crate::server::types::{AllocationId, JoinCode, PlayerId};

pub struct RelayServer {
    allocator: RelayAllocator,
}

impl RelayServer {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            allocator: RelayAllocator::new(settings),
        }
    }
}

impl Actor for RelayServer {
    type Context = Context<Self>;
}

/// Message: provision a relay allocation for `capacity` peers, owned by `owner`.
#[derive(Message)]
#[rtype(result = "Result<RelayAllocation, RelayError>")]
pub struct AllocateRelay {
    pub capacity: u32,
    pub owner: PlayerId,
}

/// Message: resolve a join code into peer connection parameters.
#[derive(Message)]
#[rtype(result = "Result<JoinAllocation, RelayError>")]
pub struct ResolveJoinCode {
    pub code: JoinCode,
}

/// Message: check that `owner` holds the live allocation behind `code`.
#[derive(Message)]
#[rtype(result = "Result<AllocationId, RelayError>")]
pub struct ClaimJoinCode {
    pub code: JoinCode,
    pub owner: PlayerId,
}

/// Message: release an allocation (idempotent). Returns whether it was live.
///
/// With a `requester`, only the owner may release; without one the caller is
/// the service itself (session close or expiry).
#[derive(Message)]
#[rtype(result = "Result<bool, RelayError>")]
pub struct ReleaseRelay {
    pub allocation_id: AllocationId,
    pub requester: Option<PlayerId>,
}

/// Message: which of these allocations are released or past their TTL.
#[derive(Message)]
#[rtype(result = "Vec<AllocationId>")]
pub struct DeadAllocations {
    pub ids: Vec<AllocationId>,
}

/// Message: expire allocations past their TTL. Returns their join codes.
#[derive(Message)]
#[rtype(result = "Vec<JoinCode>")]
pub struct SweepAllocations;

impl Handler<AllocateRelay> for RelayServer {
    type Result = Result<RelayAllocation, RelayError>;

    fn handle(&mut self, msg: AllocateRelay, _ctx: &mut Self::Context) -> Self::Result {
        self.allocator.allocate(msg.capacity, msg.owner, Instant::now())
    }
}

impl Handler<ResolveJoinCode> for RelayServer {
    type Result = Result<JoinAllocation, RelayError>;

    fn handle(&mut self, msg: ResolveJoinCode, _ctx: &mut Self::Context) -> Self::Result {
        self.allocator.resolve(&msg.code, Instant::now())
    }
}

impl Handler<ClaimJoinCode> for RelayServer {
    type Result = Result<AllocationId, RelayError>;

    fn handle(&mut self, msg: ClaimJoinCode, _ctx: &mut Self::Context) -> Self::Result {
        self.allocator.claim(&msg.code, &msg.owner, Instant::now())
    }
}

impl Handler<ReleaseRelay> for RelayServer {
    type Result = Result<bool, RelayError>;

    fn handle(&mut self, msg: ReleaseRelay, _ctx: &mut Self::Context) -> Self::Result {
        match msg.requester {
            Some(requester) => self.allocator.release_owned(msg.allocation_id, &requester),
            None => Ok(self.allocator.release(msg.allocation_id)),
        }
    }
}

impl Handler<DeadAllocations> for RelayServer {
    type Result = MessageResult<DeadAllocations>;

    fn handle(&mut self, msg: DeadAllocations, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.allocator.dead(&msg.ids, Instant::now()))
    }
}

impl Handler<SweepAllocations> for RelayServer {
    type Result = MessageResult<SweepAllocations>;

    fn handle(&mut self, _msg: SweepAllocations, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.allocator.sweep(Instant::now()))
    }
}
