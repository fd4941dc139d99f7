// src/inventory_handlers.rs
use actix_web::{web, HttpResponse};
use std::sync::Arc;
use crate::access::{self, Access, Requester};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{self, ApiResponse};
use crate::models::Reconciliation;
use crate::repositories::{InventorySessionRepository, Repository};
use crate::AppState;

/// Closes a count. REFERENT or ADMIN on the session's structure.
pub async fn validate_session(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let repo = InventorySessionRepository;
    let id = path.into_inner();
    let user_id = requester.require_user()?;

    let session = repo.fetch(pool, &id).await?;
    access::authorize_object(
        pool,
        &requester,
        &InventorySessionRepository::OWNERSHIP,
        Access::Write,
        InventorySessionRepository::TABLE,
        &id,
    )
    .await?;

    if session.is_validated() {
        return Err(ApiError::bad_request("Inventory session is already validated"));
    }
    repo.validate(pool, &id, user_id).await?;
    log::info!("Inventory session {} validated by {}", id, user_id);

    let session = repo.fetch(pool, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        session,
        "Inventory session validated".to_string(),
    )))
}

pub async fn get_reconciliation(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let repo = InventorySessionRepository;
    let id = path.into_inner();

    let session = repo.fetch(pool, &id).await?;
    access::authorize_object(
        pool,
        &requester,
        &InventorySessionRepository::OWNERSHIP,
        Access::Read,
        InventorySessionRepository::TABLE,
        &id,
    )
    .await?;

    let lines = repo.lines(pool, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(Reconciliation::build(&session, &lines))))
}

pub fn sessions_scope() -> actix_web::Scope {
    handlers::crud_scope::<InventorySessionRepository>("/inventory-sessions")
        .route("/{id}/validate", web::post().to(validate_session))
        .route("/{id}/reconciliation", web::get().to(get_reconciliation))
}
