use std::time::Instant;

use actix::ActorContext;
use actix_web_actors::ws;
use serde_json::Value;

use crate::server::anti_spam::AntiSpamState;
use crate::server::errors::ws_error_message;

/// Send and ban helpers for WebSocket actors guarded by an `AntiSpamState`.
pub trait WsActorUtils {
    fn anti_spam(&mut self) -> &mut AntiSpamState;
    fn player_id(&self) -> &str;

    /// Send a ban notice, close and stop the actor.
    fn send_ban_and_close<A>(&mut self, ctx: &mut ws::WebsocketContext<A>)
    where
        A: actix::Actor<Context = ws::WebsocketContext<A>>,
    {
        let context = serde_json::json!({
            "player": self.player_id(),
            "ban_remaining_secs": self.anti_spam().ban_remaining_secs(Instant::now()),
        });
        ctx.text(ws_error_message(
            "BANNED",
            "Too many frames on this connection. Try again later.",
            Some(context),
        ));
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Policy,
            description: Some("Banned for flooding".into()),
        }));
        ctx.stop();
    }

    /// Send an error frame, or ban if the response budget is gone.
    fn send_error_or_ban<A>(
        &mut self,
        ctx: &mut ws::WebsocketContext<A>,
        code: &str,
        message: &str,
        context: Option<Value>,
    ) where
        A: actix::Actor<Context = ws::WebsocketContext<A>>,
    {
        self.send_text_or_ban(ctx, ws_error_message(code, message, context));
    }

    /// Send a text frame, or ban if the response budget is gone.
    fn send_text_or_ban<A>(&mut self, ctx: &mut ws::WebsocketContext<A>, text: String)
    where
        A: actix::Actor<Context = ws::WebsocketContext<A>>,
    {
        let player_id = self.player_id().to_string();
        if self.anti_spam().record_response(&player_id, Instant::now()) {
            self.send_ban_and_close(ctx);
            return;
        }
        ctx.text(text);
    }
}
