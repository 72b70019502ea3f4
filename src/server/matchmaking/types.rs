//! Matchmaking state machine and the values a join attempt produces.

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::server::directory::types::SessionSummary;
use crate::server::errors::ServiceError;
use crate::server::relay::types::{JoinAllocation, RelayAllocation};
use crate::server::types::{JoinCode, PlayerId, SessionId};

/// Phase of a single join attempt.
///
/// Success path: `Searching -> Found -> Reserved -> Resolved`.
/// Fallback path: `Searching -> NotFound -> CreatingNew -> Hosting`.
/// `Failed` is reachable from any non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinPhase {
    Searching,
    Found,
    Reserved,
    Resolved,
    NotFound,
    CreatingNew,
    Hosting,
    Failed,
}

impl JoinPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, JoinPhase::Resolved | JoinPhase::Hosting | JoinPhase::Failed)
    }

    pub fn can_advance_to(self, next: JoinPhase) -> bool {
        use JoinPhase::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Searching, Found | NotFound)
            | (Found, Reserved | NotFound)
            | (Reserved, Resolved | NotFound)
            // A stale session sends the attempt back to the query step.
            | (Reserved, Searching)
            | (NotFound, CreatingNew)
            | (CreatingNew, Hosting) => true,
            _ => false,
        }
    }
}

/// One join attempt moving through `JoinPhase`s. Keeps the path it took.
#[derive(Debug, Clone)]
pub struct JoinAttempt {
    id: Uuid,
    player: PlayerId,
    history: Vec<JoinPhase>,
}

impl JoinAttempt {
    /// Attempt starting with a directory search.
    pub fn new(player: PlayerId) -> Self {
        Self::starting_at(player, JoinPhase::Searching)
    }

    /// Attempt entering the state machine at `phase` (e.g. a direct create).
    pub fn starting_at(player: PlayerId, phase: JoinPhase) -> Self {
        Self {
            id: Uuid::new_v4(),
            player,
            history: vec![phase],
        }
    }

    pub fn phase(&self) -> JoinPhase {
        self.history.last().copied().unwrap_or(JoinPhase::Searching)
    }

    pub fn history(&self) -> &[JoinPhase] {
        &self.history
    }

    pub fn player(&self) -> &PlayerId {
        &self.player
    }

    /// Move to `next`, refusing transitions the state machine does not allow.
    pub fn advance(&mut self, next: JoinPhase) -> Result<(), ServiceError> {
        let current = self.phase();
        if !current.can_advance_to(next) {
            return Err(ServiceError::Failed {
                reason: format!("illegal join transition {current:?} -> {next:?}"),
            });
        }
        debug!(
            "[Matchmaking] attempt={} player={} {:?} -> {:?}",
            self.id, self.player, current, next
        );
        self.history.push(next);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Host,
    Peer,
}

/// Client-side handle on the session a player belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub player: PlayerId,
    pub host: PlayerId,
    pub role: Role,
    pub join_code: Option<JoinCode>,
}

impl SessionHandle {
    pub fn is_host(&self) -> bool {
        self.role == Role::Host && self.player == self.host
    }
}

/// A reserved slot in an existing session plus its relay parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTicket {
    pub handle: SessionHandle,
    pub session: SessionSummary,
    pub relay: JoinAllocation,
}

/// A session the caller now hosts, with its relay allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedSession {
    pub handle: SessionHandle,
    pub session: SessionSummary,
    pub allocation: RelayAllocation,
}

/// Result of quick-join. `NotFound` is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data")]
pub enum QuickJoin {
    Joined(JoinTicket),
    NotFound,
}

/// Terminal outcome of join-or-create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data")]
pub enum JoinOutcome {
    Joined(JoinTicket),
    Hosting(HostedSession),
}

impl JoinOutcome {
    pub fn handle(&self) -> &SessionHandle {
        match self {
            JoinOutcome::Joined(ticket) => &ticket.handle,
            JoinOutcome::Hosting(hosted) => &hosted.handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use JoinPhase::*;

    #[test]
    fn success_and_fallback_paths_are_allowed() {
        let mut attempt = JoinAttempt::new("p".into());
        for phase in [Found, Reserved, Resolved] {
            attempt.advance(phase).unwrap();
        }
        assert_eq!(attempt.history(), &[Searching, Found, Reserved, Resolved]);

        let mut attempt = JoinAttempt::new("p".into());
        for phase in [NotFound, CreatingNew, Hosting] {
            attempt.advance(phase).unwrap();
        }
        assert_eq!(attempt.phase(), Hosting);
    }

    #[test]
    fn terminal_phases_are_final() {
        for terminal in [Resolved, Hosting, Failed] {
            for next in [Searching, Found, Failed, Hosting] {
                assert!(!terminal.can_advance_to(next), "{terminal:?} -> {next:?}");
            }
        }
    }

    #[test]
    fn failed_reachable_from_any_open_phase() {
        for phase in [Searching, Found, Reserved, NotFound, CreatingNew] {
            assert!(phase.can_advance_to(Failed));
        }
    }

    #[test]
    fn illegal_transition_is_reported() {
        let mut attempt = JoinAttempt::new("p".into());
        let err = attempt.advance(Hosting).unwrap_err();
        assert_eq!(err.code(), "FAILED");
        assert_eq!(attempt.phase(), Searching);
    }

    #[test]
    fn quick_join_serializes_with_status_tag() {
        let json = serde_json::to_value(QuickJoin::NotFound).unwrap();
        assert_eq!(json["status"], "NotFound");
    }
}
