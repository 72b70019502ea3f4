/// WebSocket host channel.
///
/// One actor per connected host. The host sends `Heartbeat` frames for the
/// sessions it hosts; each is forwarded to the directory and acknowledged with
/// the resulting `HeartbeatStatus` or an error frame. The channel is guarded by
/// the per-connection anti-spam limiter.
use actix::prelude::*;
use actix_web::{Error, HttpRequest, HttpResponse, ResponseError, web};
use actix_web_actors::ws;
use log::{info, warn};
use std::time::Instant;

use super::messages::{ClientWsMessage, ServerWsMessage};
use crate::server::anti_spam::AntiSpamState;
use crate::server::auth::authenticate;
use crate::server::directory::DirectoryServer;
use crate::server::directory::server::Heartbeat;
use crate::server::errors::ServiceError;
use crate::server::state::AppState;
use crate::server::types::{PlayerId, SessionId};
use crate::server::ws_actor_utils::WsActorUtils;

pub struct HostSession {
    pub player_id: PlayerId,
    pub directory: Addr<DirectoryServer>,
    pub anti_spam: AntiSpamState,
}

impl HostSession {
    pub fn new(player_id: PlayerId, directory: Addr<DirectoryServer>) -> Self {
        Self {
            player_id,
            directory,
            anti_spam: AntiSpamState::new(Instant::now()),
        }
    }

    fn heartbeat(&mut self, session_id: SessionId, timestamp: u64, ctx: &mut ws::WebsocketContext<Self>) {
        self.directory
            .send(Heartbeat {
                session_id,
                host: self.player_id.clone(),
                timestamp,
            })
            .into_actor(self)
            .then(move |res, act, ctx| {
                match res.map_err(ServiceError::directory_mailbox) {
                    Ok(Ok(status)) => act.send_frame(ctx, &ServerWsMessage::heartbeat_ack(session_id, status)),
                    Ok(Err(e)) => act.send_service_error(ctx, session_id, &ServiceError::from(e)),
                    Err(e) => act.send_service_error(ctx, session_id, &e),
                }
                fut::ready(())
            })
            .spawn(ctx);
    }

    fn send_service_error(
        &mut self,
        ctx: &mut ws::WebsocketContext<Self>,
        session_id: SessionId,
        err: &ServiceError,
    ) {
        warn!("[HostChannel] Heartbeat from {} rejected: {}", self.player_id, err);
        let context = serde_json::json!({ "session_id": session_id });
        self.send_error_or_ban(ctx, err.code(), &err.to_string(), Some(context));
    }

    fn send_frame(&mut self, ctx: &mut ws::WebsocketContext<Self>, msg: &ServerWsMessage) {
        match serde_json::to_string(msg) {
            Ok(text) => self.send_text_or_ban(ctx, text),
            Err(e) => {
                warn!("[HostChannel] Failed to serialize ServerWsMessage: {}", e);
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Error,
                    description: Some("Internal server error".into()),
                }));
                ctx.stop();
            }
        }
    }
}

impl WsActorUtils for HostSession {
    fn anti_spam(&mut self) -> &mut AntiSpamState {
        &mut self.anti_spam
    }

    fn player_id(&self) -> &str {
        &self.player_id
    }
}

impl Actor for HostSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("[HostChannel] Host connected: {}", self.player_id);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("[HostChannel] Host disconnected: {}", self.player_id);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for HostSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                if self.anti_spam.record_request(&self.player_id, Instant::now()) {
                    self.send_ban_and_close(ctx);
                    return;
                }
                match serde_json::from_str::<ClientWsMessage>(&text) {
                    Ok(ClientWsMessage::Heartbeat { session_id, timestamp }) => {
                        self.heartbeat(session_id, timestamp, ctx);
                    }
                    Ok(ClientWsMessage::Ping) => self.send_frame(ctx, &ServerWsMessage::Pong),
                    Err(_) => {
                        self.send_error_or_ban(ctx, "INVALID_MESSAGE", "Invalid client message", None);
                    }
                }
            }
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("[HostChannel] Protocol error from {}: {}", self.player_id, e);
                ctx.stop();
            }
            _ => (),
        }
    }
}

impl Handler<ServerWsMessage> for HostSession {
    type Result = ();

    fn handle(&mut self, msg: ServerWsMessage, ctx: &mut Self::Context) {
        self.send_frame(ctx, &msg);
    }
}

/// WebSocket endpoint for session hosts. Requires a player token.
pub async fn ws_host(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let player_id = match authenticate(&req, data.authenticator.as_ref()) {
        Ok(player_id) => player_id,
        Err(e) => return Ok(e.error_response()),
    };
    ws::start(HostSession::new(player_id, data.directory.clone()), &req, stream)
}
