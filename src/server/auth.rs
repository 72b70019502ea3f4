//! Player identity.
//!
//! The service does not own accounts. An `Authenticator` turns an opaque bearer
//! token into a stable player id; the directory compares that id against a
//! session's host. `AnonymousAuthenticator` is the in-process implementation:
//! it hands out a fresh id and token to anyone who asks.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use actix_web::http::header::AUTHORIZATION;
use actix_web::{HttpRequest, HttpResponse, web};
use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::server::errors::ServiceError;
use crate::server::state::AppState;
use crate::server::types::PlayerId;

const TOKEN_BYTES: usize = 32;

pub trait Authenticator: Send + Sync {
    /// Player behind `token`, if the token is known.
    fn identify(&self, token: &str) -> Option<PlayerId>;
}

/// Credentials returned by anonymous sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub player_id: PlayerId,
    pub token: String,
}

#[derive(Default)]
pub struct AnonymousAuthenticator {
    tokens: RwLock<HashMap<String, PlayerId>>,
}

impl AnonymousAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign in a new anonymous player.
    pub fn issue(&self) -> Identity {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill(&mut bytes);
        let identity = Identity {
            player_id: Uuid::new_v4().to_string(),
            token: hex::encode(bytes),
        };
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.token.clone(), identity.player_id.clone());
        info!("[Auth] Anonymous player signed in: {}", identity.player_id);
        identity
    }
}

impl Authenticator for AnonymousAuthenticator {
    fn identify(&self, token: &str) -> Option<PlayerId> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
    }
}

/// Token from `Authorization: Bearer <token>`, or from a `token` query
/// parameter for WebSocket clients that cannot set headers.
pub fn request_token(req: &HttpRequest) -> Option<String> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());
    header.or_else(|| {
        req.query_string().split('&').find_map(|kv| {
            let mut split = kv.splitn(2, '=');
            match (split.next(), split.next()) {
                (Some("token"), Some(token)) => urlencoding::decode(token).ok().map(|t| t.into_owned()),
                _ => None,
            }
        })
    })
}

/// Resolve the calling player or fail with `Unauthenticated`.
pub fn authenticate(req: &HttpRequest, auth: &dyn Authenticator) -> Result<PlayerId, ServiceError> {
    request_token(req)
        .filter(|token| !token.is_empty())
        .and_then(|token| auth.identify(&token))
        .ok_or(ServiceError::Unauthenticated)
}

/// `POST /auth/anonymous`
pub async fn sign_in(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.authenticator.issue())
}
