/// Host-side heartbeat driver.
///
/// Runs next to a session host and keeps its sessions alive. The actor samples
/// its clock several times per interval and sends a heartbeat for each tracked
/// session once a full interval has elapsed since the previous one, so a late
/// or skipped tick delays one heartbeat instead of causing a burst. Sends are
/// dispatched without blocking the tick; their outcome is published as a
/// `HeartbeatEvent`.
///
/// Heartbeats go to any `Recipient<Heartbeat>`: the `DirectoryServer` itself
/// when the host runs in the same process, or an actor relaying them over
/// whatever transport the host uses to reach the service.

use actix::prelude::*;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::heartbeat::HOST_TICKS_PER_INTERVAL;
use crate::server::directory::server::Heartbeat;
use crate::server::directory::store::HeartbeatStatus;
use crate::server::errors::{DirectoryError, ServiceError};
use crate::server::matchmaking::types::SessionHandle;
use crate::server::types::{PlayerId, SessionId};

/// Decides when a heartbeat is due from the time actually elapsed.
#[derive(Debug, Clone, Copy)]
pub struct TickClock {
    interval: Duration,
    last: Option<Instant>,
}

impl TickClock {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// True if a heartbeat is due at `now`. The first call is always due.
    pub fn advance(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}

/// Outcome of one dispatched heartbeat.
#[derive(Message, Debug, Clone, PartialEq)]
#[rtype(result = "()")]
pub struct HeartbeatEvent {
    pub session_id: SessionId,
    pub timestamp: u64,
    pub outcome: Result<HeartbeatStatus, ServiceError>,
}

struct Tracked {
    clock: TickClock,
    last_timestamp: u64,
}

pub struct HostHeartbeat {
    identity: PlayerId,
    directory: Recipient<Heartbeat>,
    observer: Option<Recipient<HeartbeatEvent>>,
    interval: Duration,
    epoch: Instant,
    sessions: HashMap<SessionId, Tracked>,
}

impl HostHeartbeat {
    pub fn new(identity: PlayerId, directory: Recipient<Heartbeat>, interval: Duration) -> Self {
        Self {
            identity,
            directory,
            observer: None,
            interval,
            epoch: Instant::now(),
            sessions: HashMap::new(),
        }
    }

    pub fn with_observer(mut self, observer: Recipient<HeartbeatEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn tick(&mut self, ctx: &mut Context<Self>) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.epoch).as_millis() as u64;
        let due: Vec<(SessionId, u64)> = self
            .sessions
            .iter_mut()
            .filter_map(|(id, tracked)| {
                if !tracked.clock.advance(now) {
                    return None;
                }
                // Strictly increasing even if two ticks land on the same millisecond.
                tracked.last_timestamp = elapsed_ms.max(tracked.last_timestamp + 1);
                Some((*id, tracked.last_timestamp))
            })
            .collect();
        for (session_id, timestamp) in due {
            self.dispatch(session_id, timestamp, ctx);
        }
    }

    fn dispatch(&mut self, session_id: SessionId, timestamp: u64, ctx: &mut Context<Self>) {
        let message = Heartbeat {
            session_id,
            host: self.identity.clone(),
            timestamp,
        };
        self.directory
            .send(message)
            .into_actor(self)
            .then(move |res, act, _ctx| {
                let outcome = match res {
                    Ok(result) => result.map_err(ServiceError::from),
                    Err(e) => Err(ServiceError::directory_mailbox(e)),
                };
                act.settle(session_id, timestamp, outcome);
                fut::ready(())
            })
            .spawn(ctx);
    }

    fn settle(&mut self, session_id: SessionId, timestamp: u64, outcome: Result<HeartbeatStatus, ServiceError>) {
        match &outcome {
            Ok(status) => debug!("[Heartbeat] session={} timestamp={} {:?}", session_id, timestamp, status),
            Err(ServiceError::Directory(DirectoryError::NotFound(_) | DirectoryError::NotHost(_))) => {
                warn!("[Heartbeat] Session {} is gone or not ours, no longer heartbeating it", session_id);
                self.sessions.remove(&session_id);
            }
            Err(e) => warn!("[Heartbeat] Heartbeat for session {} failed: {}", session_id, e),
        }
        if let Some(observer) = &self.observer {
            observer.do_send(HeartbeatEvent {
                session_id,
                timestamp,
                outcome,
            });
        }
    }
}

impl Actor for HostHeartbeat {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let period = self.interval / HOST_TICKS_PER_INTERVAL;
        ctx.run_interval(period, |act, ctx| act.tick(ctx));
    }
}

/// Message: start heartbeating the session behind `handle`.
/// Returns false, and does nothing, unless the local identity hosts it.
#[derive(Message)]
#[rtype(result = "bool")]
pub struct TrackSession {
    pub handle: SessionHandle,
}

/// Message: stop heartbeating a session.
#[derive(Message)]
#[rtype(result = "bool")]
pub struct UntrackSession {
    pub session_id: SessionId,
}

/// Message: sessions currently heartbeated.
#[derive(Message)]
#[rtype(result = "Vec<SessionId>")]
pub struct TrackedSessions;

impl Handler<TrackSession> for HostHeartbeat {
    type Result = bool;

    fn handle(&mut self, msg: TrackSession, _ctx: &mut Self::Context) -> Self::Result {
        let handle = msg.handle;
        if !handle.is_host() || handle.host != self.identity {
            warn!(
                "[Heartbeat] Refusing to heartbeat session {} hosted by {}",
                handle.session_id, handle.host
            );
            return false;
        }
        info!("[Heartbeat] Tracking session {}", handle.session_id);
        self.sessions.entry(handle.session_id).or_insert(Tracked {
            clock: TickClock::new(self.interval),
            last_timestamp: 0,
        });
        true
    }
}

impl Handler<UntrackSession> for HostHeartbeat {
    type Result = bool;

    fn handle(&mut self, msg: UntrackSession, _ctx: &mut Self::Context) -> Self::Result {
        self.sessions.remove(&msg.session_id).is_some()
    }
}

impl Handler<TrackedSessions> for HostHeartbeat {
    type Result = MessageResult<TrackedSessions>;

    fn handle(&mut self, _msg: TrackedSessions, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.sessions.keys().copied().collect())
    }
}
