/// Heartbeat watchdog.
///
/// Sweeps the directory every `sweep_interval`: sessions whose host has been
/// silent for longer than the timeout are closed and their relay allocations
/// released. Then TTL-expired allocations are reaped on the relay side, and
/// every session whose backing allocation is no longer live (timed out or
/// released by its owner) is marked stale.

use actix::prelude::*;
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Duration;

use crate::server::directory::DirectoryServer;
use crate::server::directory::server::{BackingAllocations, ExpireSessions, MarkStaleByAllocations};
use crate::server::errors::ServiceError;
use crate::server::relay::RelayServer;
use crate::server::relay::server::{DeadAllocations, ReleaseRelay, SweepAllocations};
use crate::server::types::{AllocationId, JoinCode, SessionId};

/// What a single sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_sessions: Vec<SessionId>,
    pub released_allocations: Vec<AllocationId>,
    pub expired_codes: Vec<JoinCode>,
    pub stale_sessions: Vec<SessionId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_sessions.is_empty()
            && self.released_allocations.is_empty()
            && self.expired_codes.is_empty()
            && self.stale_sessions.is_empty()
    }
}

pub struct HeartbeatMonitor {
    directory: Addr<DirectoryServer>,
    relay: Addr<RelayServer>,
    sweep_interval: Duration,
    sweeping: bool,
}

impl HeartbeatMonitor {
    pub fn new(directory: Addr<DirectoryServer>, relay: Addr<RelayServer>, sweep_interval: Duration) -> Self {
        Self {
            directory,
            relay,
            sweep_interval,
            sweeping: false,
        }
    }

    fn scheduled_sweep(&mut self, ctx: &mut Context<Self>) {
        // A slow sweep must not pile up behind itself.
        if self.sweeping {
            return;
        }
        self.sweeping = true;
        sweep(self.directory.clone(), self.relay.clone())
            .into_actor(self)
            .then(|res, act, _ctx| {
                act.sweeping = false;
                match res {
                    Ok(report) if !report.is_empty() => {
                        info!(
                            "[Heartbeat] Sweep: {} expired, {} allocations released, {} codes timed out, {} stale",
                            report.expired_sessions.len(),
                            report.released_allocations.len(),
                            report.expired_codes.len(),
                            report.stale_sessions.len()
                        );
                    }
                    Ok(_) => debug!("[Heartbeat] Sweep: nothing to do"),
                    Err(e) => warn!("[Heartbeat] Sweep failed: {}", e),
                }
                fut::ready(())
            })
            .spawn(ctx);
    }
}

impl Actor for HeartbeatMonitor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("[Heartbeat] Watchdog started, sweeping every {:?}", self.sweep_interval);
        ctx.run_interval(self.sweep_interval, |act, ctx| act.scheduled_sweep(ctx));
    }
}

/// Message: run a sweep now and report what it did.
#[derive(Message)]
#[rtype(result = "Result<SweepReport, ServiceError>")]
pub struct SweepNow;

impl Handler<SweepNow> for HeartbeatMonitor {
    type Result = ResponseFuture<Result<SweepReport, ServiceError>>;

    fn handle(&mut self, _msg: SweepNow, _ctx: &mut Self::Context) -> Self::Result {
        Box::pin(sweep(self.directory.clone(), self.relay.clone()))
    }
}

async fn sweep(
    directory: Addr<DirectoryServer>,
    relay: Addr<RelayServer>,
) -> Result<SweepReport, ServiceError> {
    let mut report = SweepReport::default();

    let expired = directory
        .send(ExpireSessions)
        .await
        .map_err(ServiceError::directory_mailbox)?;
    for session in expired {
        report.expired_sessions.push(session.id);
        if let Some(allocation_id) = session.allocation {
            let released = relay
                .send(ReleaseRelay {
                    allocation_id,
                    requester: None,
                })
                .await
                .map_err(ServiceError::relay_mailbox)??;
            if released {
                report.released_allocations.push(allocation_id);
            }
        }
    }

    report.expired_codes = relay
        .send(SweepAllocations)
        .await
        .map_err(ServiceError::relay_mailbox)?;

    let backing = directory
        .send(BackingAllocations)
        .await
        .map_err(ServiceError::directory_mailbox)?;
    if backing.is_empty() {
        return Ok(report);
    }
    let dead = relay
        .send(DeadAllocations { ids: backing })
        .await
        .map_err(ServiceError::relay_mailbox)?;
    if !dead.is_empty() {
        report.stale_sessions = directory
            .send(MarkStaleByAllocations { allocations: dead })
            .await
            .map_err(ServiceError::directory_mailbox)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::config::directory::JOIN_CODE_KEY;
    use crate::config::relay::RelaySettings;
    use crate::server::directory::server::{CreateSession, GetSession, Heartbeat, QuerySessions};
    use crate::server::directory::types::NewSession;
    use crate::server::errors::RelayError;
    use crate::server::relay::server::{AllocateRelay, ResolveJoinCode};
    use crate::server::relay::types::RelayAllocation;

    async fn hosted(
        directory: &Addr<DirectoryServer>,
        relay: &Addr<RelayServer>,
    ) -> (SessionId, RelayAllocation) {
        let allocation = relay
            .send(AllocateRelay {
                capacity: 4,
                owner: "host".into(),
            })
            .await
            .unwrap()
            .unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert(JOIN_CODE_KEY.to_string(), allocation.join_code.clone());
        let session = directory
            .send(CreateSession {
                params: NewSession {
                    name: None,
                    capacity: 4,
                    visibility: Default::default(),
                    metadata,
                    allocation: Some(allocation.allocation_id),
                },
                host: "host".into(),
            })
            .await
            .unwrap()
            .unwrap();
        (session.id, allocation)
    }

    #[actix::test]
    async fn silent_host_loses_session_and_allocation() {
        let directory = DirectoryServer::new(Duration::from_millis(40)).start();
        let relay = RelayServer::new(RelaySettings::default()).start();
        let monitor = HeartbeatMonitor::new(directory.clone(), relay.clone(), Duration::from_secs(3600)).start();
        let (session_id, allocation) = hosted(&directory, &relay).await;
        let code = allocation.join_code;

        let report = monitor.send(SweepNow).await.unwrap().unwrap();
        assert!(report.is_empty());

        tokio::time::sleep(Duration::from_millis(80)).await;
        let report = monitor.send(SweepNow).await.unwrap().unwrap();
        assert_eq!(report.expired_sessions, vec![session_id]);
        assert_eq!(report.released_allocations, vec![allocation.allocation_id]);

        assert!(directory.send(GetSession { session_id }).await.unwrap().is_none());
        let resolved = relay.send(ResolveJoinCode { code: code.clone() }).await.unwrap();
        assert_eq!(resolved.unwrap_err(), RelayError::NotFound(code));
    }

    #[actix::test]
    async fn heartbeating_host_keeps_session() {
        let directory = DirectoryServer::new(Duration::from_millis(60)).start();
        let relay = RelayServer::new(RelaySettings::default()).start();
        let monitor = HeartbeatMonitor::new(directory.clone(), relay.clone(), Duration::from_secs(3600)).start();
        let (session_id, _) = hosted(&directory, &relay).await;

        for timestamp in 1..=4 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            directory
                .send(Heartbeat {
                    session_id,
                    host: "host".into(),
                    timestamp,
                })
                .await
                .unwrap()
                .unwrap();
            monitor.send(SweepNow).await.unwrap().unwrap();
        }
        assert!(directory.send(GetSession { session_id }).await.unwrap().is_some());
    }

    #[actix::test]
    async fn expired_allocation_marks_session_stale() {
        let directory = DirectoryServer::new(Duration::from_secs(3600)).start();
        let settings = RelaySettings {
            ttl: Duration::from_millis(20),
            ..RelaySettings::default()
        };
        let relay = RelayServer::new(settings).start();
        let monitor = HeartbeatMonitor::new(directory.clone(), relay.clone(), Duration::from_secs(3600)).start();
        let (session_id, allocation) = hosted(&directory, &relay).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = monitor.send(SweepNow).await.unwrap().unwrap();
        assert_eq!(report.expired_codes, vec![allocation.join_code]);
        assert_eq!(report.stale_sessions, vec![session_id]);
    }

    #[actix::test]
    async fn released_allocation_marks_session_stale() {
        let directory = DirectoryServer::new(Duration::from_secs(3600)).start();
        let relay = RelayServer::new(RelaySettings::default()).start();
        let monitor = HeartbeatMonitor::new(directory.clone(), relay.clone(), Duration::from_secs(3600)).start();
        let (session_id, allocation) = hosted(&directory, &relay).await;

        let released = relay
            .send(ReleaseRelay {
                allocation_id: allocation.allocation_id,
                requester: Some("host".into()),
            })
            .await
            .unwrap();
        assert_eq!(released, Ok(true));

        let report = monitor.send(SweepNow).await.unwrap().unwrap();
        assert!(report.expired_codes.is_empty(), "released, not timed out");
        assert_eq!(report.stale_sessions, vec![session_id]);
        let listed = directory.send(QuerySessions { filters: Vec::new() }).await.unwrap();
        assert_eq!(listed.count(), 0);

        let report = monitor.send(SweepNow).await.unwrap().unwrap();
        assert!(report.stale_sessions.is_empty(), "already stale");
    }

    #[actix::test]
    async fn interval_sweeps_run_without_being_asked() {
        let directory = DirectoryServer::new(Duration::from_millis(20)).start();
        let relay = RelayServer::new(RelaySettings::default()).start();
        let (session_id, _) = hosted(&directory, &relay).await;
        let _monitor = HeartbeatMonitor::new(directory.clone(), relay.clone(), Duration::from_millis(10)).start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(directory.send(GetSession { session_id }).await.unwrap().is_none());
    }
}
