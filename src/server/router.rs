//! HTTP and WebSocket routing configuration.
//!
//! JSON endpoints for the directory, the relay allocator and the matchmaker,
//! plus the WebSocket channel session hosts heartbeat through.

use actix_web::web;

use crate::server::auth::sign_in;
use crate::server::directory::http as directory;
use crate::server::heartbeat::session::ws_host;
use crate::server::matchmaking::http as matchmaking;
use crate::server::relay::http as relay;

/// Configure the application's HTTP/WebSocket routes.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/auth/anonymous").route(web::post().to(sign_in)))
        .service(
            web::resource("/sessions")
                .route(web::post().to(directory::create_session))
                .route(web::get().to(directory::query_sessions)),
        )
        .service(
            web::resource("/sessions/{id}")
                .route(web::get().to(directory::get_session))
                .route(web::delete().to(directory::close_session)),
        )
        .service(web::resource("/sessions/{id}/reserve").route(web::post().to(directory::reserve_slot)))
        .service(web::resource("/sessions/{id}/leave").route(web::post().to(directory::leave_session)))
        .service(web::resource("/sessions/{id}/heartbeat").route(web::post().to(directory::heartbeat)))
        .service(web::resource("/relay/allocations").route(web::post().to(relay::allocate)))
        .service(web::resource("/relay/allocations/{id}").route(web::delete().to(relay::release)))
        .service(web::resource("/relay/join/{code}").route(web::get().to(relay::resolve)))
        .service(web::resource("/matchmaking/quick-join").route(web::post().to(matchmaking::quick_join)))
        .service(web::resource("/matchmaking/create").route(web::post().to(matchmaking::create)))
        .service(
            web::resource("/matchmaking/join-or-create").route(web::post().to(matchmaking::join_or_create)),
        )
        .service(web::resource("/ws/host").to(ws_host));
}
