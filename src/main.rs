//! Main entry point for the rendezvous server.
//!
//! Starts the directory, relay allocator and heartbeat watchdog actors, builds
//! the shared application state and serves the HTTP/WebSocket API.

use std::sync::Arc;

use actix::Actor;
use actix_web::{App, HttpServer, web};
use log::info;

use lobby_relay::config::heartbeat::HeartbeatSettings;
use lobby_relay::config::matchmaking::RetryPolicy;
use lobby_relay::config::relay::RelaySettings;
use lobby_relay::server::auth::AnonymousAuthenticator;
use lobby_relay::server::directory::DirectoryServer;
use lobby_relay::server::heartbeat::HeartbeatMonitor;
use lobby_relay::server::matchmaking::Matchmaker;
use lobby_relay::server::relay::RelayServer;
use lobby_relay::server::router;
use lobby_relay::server::state::AppState;

/// Environment variable holding the `host:port` to listen on.
const BIND_ENV: &str = "LOBBY_RELAY_BIND";
const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger from RUST_LOG.
    env_logger::init();

    let heartbeat = HeartbeatSettings::default();
    let directory = DirectoryServer::new(heartbeat.timeout).start();
    let relay = RelayServer::new(RelaySettings::default()).start();
    let _monitor = HeartbeatMonitor::new(directory.clone(), relay.clone(), heartbeat.sweep_interval).start();

    let matchmaker = Matchmaker::new(directory.clone(), relay.clone(), RetryPolicy::default());
    let state = web::Data::new(AppState::new(
        directory,
        relay,
        matchmaker,
        Arc::new(AnonymousAuthenticator::new()),
    ));

    let bind = std::env::var(BIND_ENV).unwrap_or_else(|_| DEFAULT_BIND.to_string());
    info!("[Server] Listening on {}", bind);

    HttpServer::new(move || {
        App::new()
            .wrap(
                actix_web::middleware::DefaultHeaders::new()
                    .add(("Access-Control-Allow-Origin", "*"))
                    .add(("Access-Control-Allow-Headers", "*")),
            )
            .app_data(state.clone())
            .configure(router::config)
    })
    .bind(bind)?
    .run()
    .await
}
