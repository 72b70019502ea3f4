//! Application state shared by the HTTP and WebSocket handlers.

use std::sync::Arc;

use actix::Addr;

use crate::server::auth::AnonymousAuthenticator;
use crate::server::directory::DirectoryServer;
use crate::server::matchmaking::Matchmaker;
use crate::server::relay::RelayServer;

pub struct AppState {
    /// Session directory actor (create, query, reserve, heartbeat).
    pub directory: Addr<DirectoryServer>,
    /// Relay allocator actor (allocate, resolve, release).
    pub relay: Addr<RelayServer>,
    pub matchmaker: Matchmaker,
    pub authenticator: Arc<AnonymousAuthenticator>,
}

impl AppState {
    pub fn new(
        directory: Addr<DirectoryServer>,
        relay: Addr<RelayServer>,
        matchmaker: Matchmaker,
        authenticator: Arc<AnonymousAuthenticator>,
    ) -> Self {
        AppState {
            directory,
            relay,
            matchmaker,
            authenticator,
        }
    }
}
