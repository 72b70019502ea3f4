//! HTTP endpoints of the matchmaker.

use actix_web::{HttpRequest, HttpResponse, web};

use super::messages::{CreateRequest, JoinOrCreateRequest, QuickJoinRequest};
use crate::server::auth::authenticate;
use crate::server::errors::ServiceError;
use crate::server::state::AppState;

/// `POST /matchmaking/quick-join`. A miss is `{"status":"NotFound"}`, not an error.
pub async fn quick_join(
    req: HttpRequest,
    body: Option<web::Json<QuickJoinRequest>>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let player = authenticate(&req, data.authenticator.as_ref())?;
    let filters = body.map(|b| b.into_inner().filters).unwrap_or_default();
    let outcome = data.matchmaker.quick_join(&player, filters).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// `POST /matchmaking/create`
pub async fn create(
    req: HttpRequest,
    body: Option<web::Json<CreateRequest>>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let host = authenticate(&req, data.authenticator.as_ref())?;
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let hosted = data.matchmaker.create_new(&host, request).await?;
    Ok(HttpResponse::Created().json(hosted))
}

/// `POST /matchmaking/join-or-create`
pub async fn join_or_create(
    req: HttpRequest,
    body: Option<web::Json<JoinOrCreateRequest>>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let player = authenticate(&req, data.authenticator.as_ref())?;
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let filters = request.effective_filters();
    let outcome = data.matchmaker.join_or_create(&player, filters, request.create).await?;
    Ok(HttpResponse::Ok().json(outcome))
}
