/// Session directory configuration constants.
///
/// This module defines the well-known metadata key carrying a session's relay
/// join code and the limits applied to advertised sessions.

/// Metadata key under which a session advertises its relay join code.
pub const JOIN_CODE_KEY: &str = "JOIN_CODE";

/// Name given to sessions created without an explicit name.
pub const DEFAULT_SESSION_NAME: &str = "Lobby Name";

/// Maximum length (in bytes) of a session display name.
pub const MAX_SESSION_NAME_LEN: usize = 64;

/// Maximum number of custom metadata entries on a session.
pub const MAX_METADATA_ENTRIES: usize = 32;
