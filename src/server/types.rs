//! Identifier types shared by every component.

use uuid::Uuid;

/// Stable player identity issued by the authenticator.
pub type PlayerId = String;

/// Opaque session identifier.
pub type SessionId = Uuid;

/// Relay allocation identifier.
pub type AllocationId = Uuid;

/// Short human-shareable code resolving to one relay allocation.
pub type JoinCode = String;
