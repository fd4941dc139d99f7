// src/organization_handlers.rs
use actix_web::{web, HttpResponse};
use std::sync::Arc;
use crate::access::Requester;
use crate::error::{ApiError, ApiResult};
use crate::handlers::{self, ApiResponse, ListQuery, PaginatedResponse};
use crate::models::Membership;
use crate::repositories::{MembershipRepository, Repository};
use crate::AppState;

/// Superusers page through every membership; everyone else sees their own.
pub async fn list_memberships(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let user_id = requester.require_user()?;
    let pool = &app_state.db_pool;
    let repo = MembershipRepository;

    if requester.is_superuser {
        let page = repo.list(pool, &crate::access::ListScope::All, &query).await?;
        return Ok(HttpResponse::Ok().json(ApiResponse::success(page)));
    }

    let (page, per_page, offset) = query.normalize();
    let own: Vec<Membership> = repo.list_for_user(pool, user_id).await?;
    let total = own.len() as i64;
    let data = own
        .into_iter()
        .skip(offset as usize)
        .take(per_page as usize)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse::new(data, total, page, per_page))))
}

pub async fn get_membership(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user_id = requester.require_user()?;
    let membership = MembershipRepository.fetch(&app_state.db_pool, &path.into_inner()).await?;

    if !requester.is_superuser && membership.user_id != user_id {
        log::debug!("Membership {} hidden from user {}", membership.id, user_id);
        return Err(ApiError::forbidden("You can only view your own memberships."));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(membership)))
}

/// Own-row reads plus the superuser-only generic writes.
pub fn memberships_scope() -> actix_web::Scope {
    web::scope("/memberships")
        .route("", web::get().to(list_memberships))
        .route("", web::post().to(handlers::create::<MembershipRepository>))
        .route("/{id}", web::get().to(get_membership))
        .route("/{id}", web::put().to(handlers::update::<MembershipRepository>))
        .route("/{id}", web::patch().to(handlers::update::<MembershipRepository>))
        .route("/{id}", web::delete().to(handlers::delete::<MembershipRepository>))
}
