/// Matchmaker.
///
/// Drives join attempts through the `JoinPhase` state machine: quick-join an
/// existing session (query, reserve, resolve the relay join code) or fall back
/// to allocating a relay and advertising a new session. The matchmaker holds no
/// session state of its own; the caller receives an explicit `SessionHandle`.
///
/// It is also the one place that touches both actors at once, so the calls
/// that must keep a session and its relay allocation in step (advertising with
/// a claimed code, closing, releasing) go through here as well.
///
/// Expected misses (`Full`, `NotFound`, stale relay codes) steer the state
/// machine. Transient provider errors are retried with bounded backoff; when
/// retries run out the attempt ends in `Failed` instead of pretending nothing
/// was found, so a flaky directory never leads to duplicate sessions.

use actix::Addr;
use std::future::Future;

use log::{debug, info, warn};

use super::messages::CreateRequest;
use super::types::{
    HostedSession, JoinAttempt, JoinOutcome, JoinPhase, JoinTicket, QuickJoin, Role, SessionHandle,
};
use crate::config::directory::JOIN_CODE_KEY;
use crate::config::matchmaking::{RetryPolicy, STALE_REQUERIES};
use crate::server::directory::DirectoryServer;
use crate::server::directory::server::{
    CloseSession, CreateSession, MarkStale, MarkStaleByAllocations, QuerySessions, ReleaseSlot,
    ReserveSlot,
};
use crate::server::directory::store::{Reservation, SessionQuery};
use crate::server::directory::types::{FilterField, FilterOp, NewSession, SessionFilter, SessionSummary};
use crate::server::errors::{DirectoryError, RelayError, ServiceError};
use crate::server::relay::RelayServer;
use crate::server::relay::join_code;
use crate::server::relay::server::{AllocateRelay, ClaimJoinCode, ReleaseRelay, ResolveJoinCode};
use crate::server::relay::types::{JoinAllocation, RelayAllocation};
use crate::server::types::{AllocationId, PlayerId, SessionId};

/// Slot taken during a join attempt. Released on drop unless committed, so an
/// attempt abandoned on any path (error, timeout, cancelled future) gives its
/// slot back.
pub struct ReservationGuard {
    directory: Addr<DirectoryServer>,
    session_id: SessionId,
    player: PlayerId,
    armed: bool,
}

impl ReservationGuard {
    pub fn new(directory: Addr<DirectoryServer>, reservation: &Reservation, player: PlayerId) -> Self {
        Self {
            directory,
            session_id: reservation.session.id,
            player,
            // A slot the player already held before this attempt is not ours to give back.
            armed: !reservation.already_member,
        }
    }

    /// Keep the slot.
    pub fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if self.armed {
            debug!(
                "[Matchmaking] Releasing abandoned reservation: session={} player={}",
                self.session_id, self.player
            );
            self.directory.do_send(ReleaseSlot {
                session_id: self.session_id,
                player: self.player.clone(),
            });
        }
    }
}

/// Quick-join / create orchestrator over the directory and relay actors.
#[derive(Clone)]
pub struct Matchmaker {
    directory: Addr<DirectoryServer>,
    relay: Addr<RelayServer>,
    retry: RetryPolicy,
}

impl Matchmaker {
    pub fn new(directory: Addr<DirectoryServer>, relay: Addr<RelayServer>, retry: RetryPolicy) -> Self {
        Self {
            directory,
            relay,
            retry,
        }
    }

    /// Join any public session matching `filters`, newest first.
    ///
    /// Returns `QuickJoin::NotFound` when nothing is joinable; errors only for
    /// provider failures that outlived the retry budget.
    pub async fn quick_join(
        &self,
        player: &PlayerId,
        filters: Vec<SessionFilter>,
    ) -> Result<QuickJoin, ServiceError> {
        let mut attempt = JoinAttempt::new(player.clone());
        match self.search(&mut attempt, filters).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.fail(&mut attempt, err)),
        }
    }

    /// Allocate a relay and advertise a new session hosted by `host`.
    pub async fn create_new(
        &self,
        host: &PlayerId,
        request: CreateRequest,
    ) -> Result<HostedSession, ServiceError> {
        let mut attempt = JoinAttempt::starting_at(host.clone(), JoinPhase::CreatingNew);
        match self.host_new(&mut attempt, request).await {
            Ok(hosted) => Ok(hosted),
            Err(err) => Err(self.fail(&mut attempt, err)),
        }
    }

    /// Quick-join, and create a new session only if nothing was found.
    pub async fn join_or_create(
        &self,
        player: &PlayerId,
        filters: Vec<SessionFilter>,
        request: CreateRequest,
    ) -> Result<JoinOutcome, ServiceError> {
        let mut attempt = JoinAttempt::new(player.clone());
        let result = match self.search(&mut attempt, filters).await {
            Ok(QuickJoin::Joined(ticket)) => Ok(JoinOutcome::Joined(ticket)),
            Ok(QuickJoin::NotFound) => {
                info!("[Matchmaking] No session found for {}, creating one", player);
                match attempt.advance(JoinPhase::CreatingNew) {
                    Ok(()) => self.host_new(&mut attempt, request).await.map(JoinOutcome::Hosting),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        };
        result.map_err(|err| self.fail(&mut attempt, err))
    }

    /// Resolve a join code shared out of band, without going through the directory.
    pub async fn join_by_code(&self, code: &str) -> Result<JoinAllocation, ServiceError> {
        let code = code.to_string();
        self.with_retry("resolve join code", || {
            let relay = self.relay.clone();
            let code = code.clone();
            async move {
                relay
                    .send(ResolveJoinCode { code })
                    .await
                    .map_err(ServiceError::relay_mailbox)?
                    .map_err(ServiceError::from)
            }
        })
        .await
    }

    /// Advertise a session built by the caller. A join code in the metadata
    /// must name a live allocation `host` owns; the session is bound to it.
    pub async fn advertise(
        &self,
        host: &PlayerId,
        mut params: NewSession,
    ) -> Result<SessionSummary, ServiceError> {
        params.allocation = None;
        if let Some(code) = params.metadata.get_mut(JOIN_CODE_KEY) {
            *code = join_code::normalize(code);
            let code = code.clone();
            let allocation_id = self
                .relay
                .send(ClaimJoinCode {
                    code,
                    owner: host.clone(),
                })
                .await
                .map_err(ServiceError::relay_mailbox)??;
            params.allocation = Some(allocation_id);
        }
        self.create_session(params, host).await
    }

    /// Release a relay allocation as `requester`, who must own it. Any session
    /// advertising it stops being offered right away.
    pub async fn release_allocation(
        &self,
        allocation_id: AllocationId,
        requester: &PlayerId,
    ) -> Result<bool, ServiceError> {
        let released = self
            .relay
            .send(ReleaseRelay {
                allocation_id,
                requester: Some(requester.clone()),
            })
            .await
            .map_err(ServiceError::relay_mailbox)??;
        if released {
            self.directory.do_send(MarkStaleByAllocations {
                allocations: vec![allocation_id],
            });
        }
        Ok(released)
    }

    /// Give up a peer slot.
    pub async fn leave(&self, session_id: SessionId, player: &PlayerId) -> Result<bool, ServiceError> {
        self.directory
            .send(ReleaseSlot {
                session_id,
                player: player.clone(),
            })
            .await
            .map_err(ServiceError::directory_mailbox)?
            .map_err(ServiceError::from)
    }

    /// Close a session as its host and release its relay allocation.
    pub async fn close(&self, session_id: SessionId, requester: &PlayerId) -> Result<(), ServiceError> {
        let session = self
            .directory
            .send(CloseSession {
                session_id,
                requester: Some(requester.clone()),
            })
            .await
            .map_err(ServiceError::directory_mailbox)??;
        if let Some(allocation_id) = session.allocation {
            self.relay.do_send(ReleaseRelay {
                allocation_id,
                requester: None,
            });
        }
        Ok(())
    }

    /// Steps 1-4 of quick-join. Leaves `attempt` in `Resolved` or `NotFound`.
    async fn search(
        &self,
        attempt: &mut JoinAttempt,
        mut filters: Vec<SessionFilter>,
    ) -> Result<QuickJoin, ServiceError> {
        filters.push(SessionFilter::new(FilterField::AvailableSlots, FilterOp::Ge, "1"));
        let player = attempt.player().clone();

        for round in 0..=STALE_REQUERIES {
            if round > 0 {
                attempt.advance(JoinPhase::Searching)?;
            }
            // A host never quick-joins its own session, and a session without a
            // relay allocation is listed but cannot be joined through one.
            let mut candidates = self
                .query(filters.clone())
                .await?
                .filter(|s| s.host != player && s.allocation_id.is_some())
                .peekable();
            if candidates.peek().is_none() {
                attempt.advance(JoinPhase::NotFound)?;
                return Ok(QuickJoin::NotFound);
            }
            attempt.advance(JoinPhase::Found)?;

            let Some((session, guard)) = self.reserve_first(candidates, &player).await? else {
                debug!("[Matchmaking] Every candidate filled up before {} could reserve", player);
                attempt.advance(JoinPhase::NotFound)?;
                return Ok(QuickJoin::NotFound);
            };
            attempt.advance(JoinPhase::Reserved)?;

            let resolved = match session.join_code() {
                Some(code) => self.resolve(code).await,
                None => Err(ServiceError::Relay(RelayError::NotFound(String::new()))),
            };
            let relay = match resolved {
                Ok(relay) if session.allocation_id == Some(relay.host_allocation_id) => Some(relay),
                Ok(relay) => {
                    warn!(
                        "[Matchmaking] Join code of session {} now belongs to allocation {}",
                        session.id, relay.host_allocation_id
                    );
                    None
                }
                Err(ServiceError::Relay(RelayError::NotFound(_) | RelayError::Expired(_))) => None,
                Err(err) => return Err(err),
            };
            match relay {
                Some(relay) => {
                    guard.commit();
                    attempt.advance(JoinPhase::Resolved)?;
                    info!("[Matchmaking] {} joined session {}", player, session.id);
                    let handle = SessionHandle {
                        session_id: session.id,
                        player: player.clone(),
                        host: session.host.clone(),
                        role: Role::Peer,
                        join_code: Some(relay.join_code.clone()),
                    };
                    return Ok(QuickJoin::Joined(JoinTicket {
                        handle,
                        session,
                        relay,
                    }));
                }
                None => {
                    warn!(
                        "[Matchmaking] Session {} has no live relay allocation, marking stale",
                        session.id
                    );
                    drop(guard);
                    self.directory.do_send(MarkStale { session_id: session.id });
                }
            }
        }

        attempt.advance(JoinPhase::NotFound)?;
        Ok(QuickJoin::NotFound)
    }

    /// Try candidates in directory order until one reservation succeeds.
    async fn reserve_first(
        &self,
        candidates: impl Iterator<Item = SessionSummary>,
        player: &PlayerId,
    ) -> Result<Option<(SessionSummary, ReservationGuard)>, ServiceError> {
        for candidate in candidates {
            match self.reserve(candidate.id, player).await {
                Ok(reservation) => {
                    let guard = ReservationGuard::new(self.directory.clone(), &reservation, player.clone());
                    return Ok(Some((reservation.session, guard)));
                }
                Err(ServiceError::Directory(DirectoryError::Full(_) | DirectoryError::NotFound(_))) => {
                    debug!("[Matchmaking] Candidate {} no longer joinable", candidate.id);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Fallback path. Leaves `attempt` in `Hosting`.
    async fn host_new(
        &self,
        attempt: &mut JoinAttempt,
        request: CreateRequest,
    ) -> Result<HostedSession, ServiceError> {
        let host = attempt.player().clone();
        if request.capacity < 1 {
            return Err(DirectoryError::InvalidCapacity(request.capacity).into());
        }
        let allocation = self.allocate(request.capacity, &host).await?;

        let mut params = request.into_new_session();
        params
            .metadata
            .insert(JOIN_CODE_KEY.to_string(), allocation.join_code.clone());
        params.allocation = Some(allocation.allocation_id);
        let session = match self.create_session(params, &host).await {
            Ok(session) => session,
            Err(err) => {
                // The allocation would otherwise live out its TTL with nobody using it.
                self.relay.do_send(ReleaseRelay {
                    allocation_id: allocation.allocation_id,
                    requester: None,
                });
                return Err(err);
            }
        };
        attempt.advance(JoinPhase::Hosting)?;
        info!(
            "[Matchmaking] {} hosting session {} with join code {}",
            host, session.id, allocation.join_code
        );

        Ok(HostedSession {
            handle: SessionHandle {
                session_id: session.id,
                player: host.clone(),
                host,
                role: Role::Host,
                join_code: Some(allocation.join_code.clone()),
            },
            session,
            allocation,
        })
    }

    /// Record the failure on the attempt and turn exhausted provider errors into `Failed`.
    fn fail(&self, attempt: &mut JoinAttempt, err: ServiceError) -> ServiceError {
        if !attempt.phase().is_terminal() {
            let _ = attempt.advance(JoinPhase::Failed);
        }
        warn!(
            "[Matchmaking] Join attempt for {} failed after {:?}: {}",
            attempt.player(),
            attempt.history(),
            err
        );
        if err.is_retryable() {
            ServiceError::Failed {
                reason: err.to_string(),
            }
        } else {
            err
        }
    }

    async fn query(&self, filters: Vec<SessionFilter>) -> Result<SessionQuery, ServiceError> {
        self.with_retry("query sessions", || {
            let directory = self.directory.clone();
            let filters = filters.clone();
            async move {
                directory
                    .send(QuerySessions { filters })
                    .await
                    .map_err(ServiceError::directory_mailbox)
            }
        })
        .await
    }

    async fn reserve(&self, session_id: SessionId, player: &PlayerId) -> Result<Reservation, ServiceError> {
        self.with_retry("reserve slot", || {
            let directory = self.directory.clone();
            let player = player.clone();
            async move {
                directory
                    .send(ReserveSlot { session_id, player })
                    .await
                    .map_err(ServiceError::directory_mailbox)?
                    .map_err(ServiceError::from)
            }
        })
        .await
    }

    async fn resolve(&self, code: &str) -> Result<JoinAllocation, ServiceError> {
        self.join_by_code(code).await
    }

    async fn allocate(&self, capacity: u32, owner: &PlayerId) -> Result<RelayAllocation, ServiceError> {
        self.with_retry("allocate relay", || {
            let relay = self.relay.clone();
            let owner = owner.clone();
            async move {
                relay
                    .send(AllocateRelay { capacity, owner })
                    .await
                    .map_err(ServiceError::relay_mailbox)?
                    .map_err(ServiceError::from)
            }
        })
        .await
    }

    async fn create_session(
        &self,
        params: NewSession,
        host: &PlayerId,
    ) -> Result<SessionSummary, ServiceError> {
        self.with_retry("create session", || {
            let directory = self.directory.clone();
            let params = params.clone();
            let host = host.clone();
            async move {
                directory
                    .send(CreateSession { params, host })
                    .await
                    .map_err(ServiceError::directory_mailbox)?
                    .map_err(ServiceError::from)
            }
        })
        .await
    }

    /// Run `op`, retrying retryable errors with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut retries = 0;
        loop {
            match op().await {
                Err(err) if err.is_retryable() && retries < self.retry.retries => {
                    let delay = self.retry.backoff(retries);
                    warn!("[Matchmaking] {} failed ({}), retrying in {:?}", what, err, delay);
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                result => return result,
            }
        }
    }
}
