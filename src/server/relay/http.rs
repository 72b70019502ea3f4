//! HTTP endpoints of the relay allocator.

use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};

use super::server::AllocateRelay;
use crate::config::relay::DEFAULT_ALLOCATION_CAPACITY;
use crate::server::auth::authenticate;
use crate::server::errors::ServiceError;
use crate::server::state::AppState;
use crate::server::types::AllocationId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocateBody {
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_capacity() -> u32 {
    DEFAULT_ALLOCATION_CAPACITY
}

/// `POST /relay/allocations`
pub async fn allocate(
    req: HttpRequest,
    body: Option<web::Json<AllocateBody>>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let owner = authenticate(&req, data.authenticator.as_ref())?;
    let capacity = body.map_or_else(default_capacity, |b| b.capacity);
    let allocation = data
        .relay
        .send(AllocateRelay { capacity, owner })
        .await
        .map_err(ServiceError::relay_mailbox)??;
    Ok(HttpResponse::Created().json(allocation))
}

/// `GET /relay/join/{code}`
pub async fn resolve(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    authenticate(&req, data.authenticator.as_ref())?;
    let joined = data.matchmaker.join_by_code(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(joined))
}

/// `DELETE /relay/allocations/{id}`. Owner only; idempotent once released.
pub async fn release(
    req: HttpRequest,
    path: web::Path<AllocationId>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let requester = authenticate(&req, data.authenticator.as_ref())?;
    data.matchmaker
        .release_allocation(path.into_inner(), &requester)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
