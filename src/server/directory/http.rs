//! HTTP endpoints of the session directory.

use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::server::{GetSession, Heartbeat, QuerySessions, ReserveSlot};
use super::store::HeartbeatStatus;
use super::types::{NewSession, SessionFilter, SessionSummary};
use crate::server::auth::authenticate;
use crate::server::errors::{DirectoryError, ServiceError};
use crate::server::state::AppState;
use crate::server::types::SessionId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatBody {
    pub timestamp: u64,
}

/// Filters from repeated `filter=field:op:value` query parameters.
pub fn parse_filters(query: &str) -> Result<Vec<SessionFilter>, ServiceError> {
    query
        .split('&')
        .filter_map(|kv| {
            let mut split = kv.splitn(2, '=');
            match (split.next(), split.next()) {
                (Some("filter"), Some(raw)) => Some(raw),
                _ => None,
            }
        })
        .map(|raw| {
            let decoded = urlencoding::decode(raw)
                .map_err(|e| ServiceError::BadRequest(format!("malformed filter encoding: {e}")))?;
            SessionFilter::parse(&decoded).map_err(ServiceError::BadRequest)
        })
        .collect()
}

/// `POST /sessions`. A `JOIN_CODE` entry must name the caller's own live allocation.
pub async fn create_session(
    req: HttpRequest,
    body: web::Json<NewSession>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let host = authenticate(&req, data.authenticator.as_ref())?;
    let session = data.matchmaker.advertise(&host, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(session))
}

/// `GET /sessions/{id}`
pub async fn get_session(
    path: web::Path<SessionId>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let session_id = path.into_inner();
    let session = data
        .directory
        .send(GetSession { session_id })
        .await
        .map_err(ServiceError::directory_mailbox)?
        .ok_or(DirectoryError::NotFound(session_id))?;
    Ok(HttpResponse::Ok().json(session))
}

/// `GET /sessions?filter=...`
pub async fn query_sessions(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let filters = parse_filters(req.query_string())?;
    let sessions: Vec<SessionSummary> = data
        .directory
        .send(QuerySessions { filters })
        .await
        .map_err(ServiceError::directory_mailbox)?
        .collect();
    Ok(HttpResponse::Ok().json(sessions))
}

/// `POST /sessions/{id}/reserve`
pub async fn reserve_slot(
    req: HttpRequest,
    path: web::Path<SessionId>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let player = authenticate(&req, data.authenticator.as_ref())?;
    let reservation = data
        .directory
        .send(ReserveSlot {
            session_id: path.into_inner(),
            player,
        })
        .await
        .map_err(ServiceError::directory_mailbox)??;
    Ok(HttpResponse::Ok().json(json!({
        "status": "Reserved",
        "already_member": reservation.already_member,
        "session": reservation.session,
    })))
}

/// `POST /sessions/{id}/leave`
pub async fn leave_session(
    req: HttpRequest,
    path: web::Path<SessionId>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let player = authenticate(&req, data.authenticator.as_ref())?;
    let released = data.matchmaker.leave(path.into_inner(), &player).await?;
    Ok(HttpResponse::Ok().json(json!({ "released": released })))
}

/// `DELETE /sessions/{id}`, host only. Releases the relay allocation too.
pub async fn close_session(
    req: HttpRequest,
    path: web::Path<SessionId>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let player = authenticate(&req, data.authenticator.as_ref())?;
    data.matchmaker.close(path.into_inner(), &player).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// `POST /sessions/{id}/heartbeat`
pub async fn heartbeat(
    req: HttpRequest,
    path: web::Path<SessionId>,
    body: web::Json<HeartbeatBody>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let host = authenticate(&req, data.authenticator.as_ref())?;
    let status: HeartbeatStatus = data
        .directory
        .send(Heartbeat {
            session_id: path.into_inner(),
            host,
            timestamp: body.timestamp,
        })
        .await
        .map_err(ServiceError::directory_mailbox)??;
    Ok(HttpResponse::Ok().json(json!({ "status": "Ok", "liveness": status })))
}
