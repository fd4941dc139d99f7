// src/handlers.rs
use actix_web::{web, HttpResponse, HttpRequest};
use actix_web::error::{JsonPayloadError, QueryPayloadError};
use uuid::Uuid;
use validator::Validate;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use crate::AppState;
use crate::access::{self, Access, Requester};
use crate::error::{ApiError, ApiResult};
use crate::repositories::Repository;

pub const DEFAULT_PER_PAGE: i64 = 50;
pub const MAX_PER_PAGE: i64 = 200;

// ==================== COMMON STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = (total + per_page - 1) / per_page;
        Self { data, total, page, per_page, total_pages }
    }

    pub fn empty(page: i64, per_page: i64) -> Self {
        Self::new(Vec::new(), 0, page, per_page)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ListQuery {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let offset = (page - 1).saturating_mul(per_page);
        (page, per_page, offset)
    }
}

// ==================== EXTRACTOR CONFIG ====================

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        log::debug!("Rejected JSON body: {}", err);
        ApiError::BadRequest(format!("Malformed request body: {}", err)).into()
    })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err: QueryPayloadError, _req: &HttpRequest| {
        ApiError::BadRequest(format!("Malformed query string: {}", err)).into()
    })
}

// ==================== GENERIC CRUD ====================

fn require_superuser_writes<R: Repository>(requester: &Requester) -> ApiResult<()> {
    requester.require_user()?;
    if R::SUPERUSER_WRITES && !requester.is_superuser {
        log::debug!("Write on {} refused for non-superuser {:?}", R::TABLE, requester.user_id);
        return Err(ApiError::forbidden("Only superusers may modify this collection."));
    }
    Ok(())
}

pub async fn list<R: Repository>(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let scope = access::list_scope(&requester, &R::OWNERSHIP, R::TABLE)?;
    let page = R::default().list(&app_state.db_pool, &scope, &query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page)))
}

pub async fn create<R: Repository>(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    body: web::Json<R::Create>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let repo = R::default();
    let data = body.into_inner();

    require_superuser_writes::<R>(&requester)?;
    access::authorize_payload(pool, &requester, &R::OWNERSHIP, R::TABLE, &data).await?;

    data.validate()?;
    repo.check_create(&data).into_result()?;

    let id = Uuid::new_v4().to_string();
    repo.insert(pool, &id, data, &requester).await?;
    log::info!("{} {} created by {:?}", R::NAME, id, requester.user_id);

    let created = repo.fetch(pool, &id).await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn retrieve<R: Repository>(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let id = path.into_inner();

    let entity = R::default().fetch(pool, &id).await?;
    access::authorize_object(pool, &requester, &R::OWNERSHIP, Access::Read, R::TABLE, &id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(entity)))
}

pub async fn update<R: Repository>(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    path: web::Path<String>,
    body: web::Json<R::Update>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let repo = R::default();
    let id = path.into_inner();
    let patch = body.into_inner();

    require_superuser_writes::<R>(&requester)?;
    access::authorize_payload(pool, &requester, &R::OWNERSHIP, R::TABLE, &patch).await?;

    let existing = repo.fetch(pool, &id).await?;
    access::authorize_object(pool, &requester, &R::OWNERSHIP, Access::Write, R::TABLE, &id).await?;

    patch.validate()?;
    repo.check_update(&existing, &patch).into_result()?;

    repo.update(pool, &existing, patch).await?;
    log::info!("{} {} updated by {:?}", R::NAME, id, requester.user_id);

    let updated = repo.fetch(pool, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn delete<R: Repository>(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let repo = R::default();
    let id = path.into_inner();

    require_superuser_writes::<R>(&requester)?;
    repo.fetch(pool, &id).await?;
    access::authorize_object(pool, &requester, &R::OWNERSHIP, Access::Write, R::TABLE, &id).await?;

    repo.delete(pool, &id).await?;
    log::info!("{} {} deleted by {:?}", R::NAME, id, requester.user_id);

    Ok(HttpResponse::NoContent().finish())
}

/// `GET/POST {path}` and `GET/PUT/PATCH/DELETE {path}/{id}`.
pub fn crud_scope<R: Repository>(path: &str) -> actix_web::Scope {
    web::scope(path)
        .route("", web::get().to(list::<R>))
        .route("", web::post().to(create::<R>))
        .route("/{id}", web::get().to(retrieve::<R>))
        .route("/{id}", web::put().to(update::<R>))
        .route("/{id}", web::patch().to(update::<R>))
        .route("/{id}", web::delete().to(delete::<R>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use serde_json::{json, Value};
    use crate::db::test_pool;
    use crate::models::MembershipRole;
    use crate::testing::{self, World};

    #[actix_rt::test]
    async fn test_pagination_defaults() {
        assert_eq!(ListQuery::default().normalize(), (1, 50, 0));
        let query = ListQuery { page: Some(3), per_page: Some(1000) };
        assert_eq!(query.normalize(), (3, 200, 400));
        let query = ListQuery { page: Some(-1), per_page: Some(0) };
        assert_eq!(query.normalize(), (1, 1, 0));
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 101, 1, 50).total_pages, 3);
        assert_eq!(PaginatedResponse::<u8>::empty(1, 50).total_pages, 0);
    }

    #[actix_rt::test]
    async fn test_anonymous_requests_are_unauthorized() {
        let pool = test_pool().await;
        let app = crate::test_app!(pool);

        for uri in ["/api/v1/items", "/api/v1/stock-lines", "/api/v1/structures"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[actix_rt::test]
    async fn test_stock_lines_scoped_to_member_structures() {
        let pool = test_pool().await;
        let world = World::seed(&pool).await;
        let app = crate::test_app!(pool);

        let req = test::TestRequest::get()
            .uri("/api/v1/stock-lines/")
            .insert_header(testing::bearer(&world.referent))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        let rows = body["data"]["data"].as_array().unwrap();
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], world.ul01_stock_line.as_str());
        assert_eq!(rows[0]["lot_instance"], world.ul01_lot.as_str());

        // Superuser sees both structures.
        let req = test::TestRequest::get()
            .uri("/api/v1/stock-lines")
            .insert_header(testing::bearer(&world.root))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["total"], 2);
    }

    #[actix_rt::test]
    async fn test_user_without_memberships_lists_nothing_scoped() {
        let pool = test_pool().await;
        let world = World::seed(&pool).await;
        let outsider = testing::create_user(&pool, "outsider@crf.org", false).await;
        let app = crate::test_app!(pool);

        let req = test::TestRequest::get()
            .uri("/api/v1/containers")
            .insert_header(testing::bearer(&outsider))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["total"], 0);

        // Global catalog stays visible.
        let req = test::TestRequest::get()
            .uri("/api/v1/items")
            .insert_header(testing::bearer(&outsider))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["data"][0]["id"], world.item.as_str());
    }

    #[actix_rt::test]
    async fn test_viewer_write_denied_referent_allowed() {
        let pool = test_pool().await;
        let world = World::seed(&pool).await;
        let app = crate::test_app!(pool);
        let payload = json!({ "structure": world.ul01, "name": "Garage UL01" });

        let req = test::TestRequest::post()
            .uri("/api/v1/sites")
            .insert_header(testing::bearer(&world.viewer))
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/api/v1/sites")
            .insert_header(testing::bearer(&world.referent))
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["structure"], world.ul01.as_str());
        assert_eq!(body["data"]["name"], "Garage UL01");
    }

    #[actix_rt::test]
    async fn test_object_level_checks() {
        let pool = test_pool().await;
        let world = World::seed(&pool).await;
        let app = crate::test_app!(pool);

        // Read on another structure's container is forbidden, not hidden.
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/containers/{}", world.ul02_container))
            .insert_header(testing::bearer(&world.referent))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        // Viewer reads but cannot patch.
        let uri = format!("/api/v1/containers/{}", world.ul01_container);
        let req = test::TestRequest::get()
            .uri(&uri)
            .insert_header(testing::bearer(&world.viewer))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::patch()
            .uri(&uri)
            .insert_header(testing::bearer(&world.viewer))
            .set_json(json!({ "label": "Sac rouge" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::patch()
            .uri(&uri)
            .insert_header(testing::bearer(&world.referent))
            .set_json(json!({ "label": "Sac rouge" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["label"], "Sac rouge");
        assert_eq!(body["data"]["identifier"], "UL01-BAG-1");

        // Moving it into a structure the referent cannot write is refused up front.
        let req = test::TestRequest::patch()
            .uri(&uri)
            .insert_header(testing::bearer(&world.referent))
            .set_json(json!({ "structure": world.ul02 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/api/v1/containers/does-not-exist")
            .insert_header(testing::bearer(&world.referent))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn test_duplicate_lot_instance_rejected() {
        let pool = test_pool().await;
        let world = World::seed(&pool).await;
        let app = crate::test_app!(pool.clone());

        let req = test::TestRequest::post()
            .uri("/api/v1/lot-instances")
            .insert_header(testing::bearer(&world.referent))
            .set_json(json!({ "template": world.template, "container": world.ul01_container }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["errors"]["non_field_errors"][0]
            .as_str()
            .unwrap()
            .contains("template_id, container_id"));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lot_instances WHERE container_id = ?")
            .bind(&world.ul01_container)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
        let status: String = sqlx::query_scalar("SELECT status FROM lot_instances WHERE id = ?")
            .bind(&world.ul01_lot)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "READY");
    }

    #[actix_rt::test]
    async fn test_movement_validation() {
        let pool = test_pool().await;
        let world = World::seed(&pool).await;
        let app = crate::test_app!(pool);

        let transfer_without_destination = json!({
            "structure": world.ul01,
            "type": "TRANSFER",
            "from_lot": world.ul01_lot,
            "item": world.item,
            "quantity": 2
        });
        let req = test::TestRequest::post()
            .uri("/api/v1/stock-movements")
            .insert_header(testing::bearer(&world.referent))
            .set_json(&transfer_without_destination)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["errors"]["to_lot"].is_array());

        for quantity in [0.0, -5.0] {
            let req = test::TestRequest::post()
                .uri("/api/v1/stock-movements")
                .insert_header(testing::bearer(&world.referent))
                .set_json(json!({
                    "structure": world.ul01,
                    "type": "ADJUST",
                    "item": world.item,
                    "quantity": quantity
                }))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        }

        let req = test::TestRequest::post()
            .uri("/api/v1/stock-movements")
            .insert_header(testing::bearer(&world.referent))
            .set_json(json!({
                "structure": world.ul01,
                "type": "CONSUME",
                "from_lot": world.ul01_lot,
                "item": world.item,
                "quantity": 1.5,
                "reason": "DPS marathon",
                "created_by": world.root.id
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        // Attribution comes from the token, not the payload.
        assert_eq!(body["data"]["created_by"], world.referent.id.as_str());
        assert_eq!(body["data"]["type"], "CONSUME");
    }

    #[actix_rt::test]
    async fn test_malformed_body_is_bad_request() {
        let pool = test_pool().await;
        let world = World::seed(&pool).await;
        let app = crate::test_app!(pool);

        let req = test::TestRequest::post()
            .uri("/api/v1/containers")
            .insert_header(testing::bearer(&world.referent))
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);

        let req = test::TestRequest::post()
            .uri("/api/v1/containers")
            .insert_header(testing::bearer(&world.referent))
            .set_json(json!({ "structure": world.ul01, "type": "SUBMARINE", "identifier": "X" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_parent_membership_grants_nothing_on_child() {
        let pool = test_pool().await;
        let world = World::seed(&pool).await;
        let territorial_admin = testing::create_user(&pool, "dt@crf.org", false).await;
        testing::add_membership(&pool, &territorial_admin.id, &world.dt, MembershipRole::Admin).await;
        let app = crate::test_app!(pool);

        let req = test::TestRequest::post()
            .uri("/api/v1/containers")
            .insert_header(testing::bearer(&territorial_admin))
            .set_json(json!({ "structure": world.ul01, "type": "BAG_OXY", "identifier": "DT-1" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn test_delete_and_restrict() {
        let pool = test_pool().await;
        let world = World::seed(&pool).await;
        let app = crate::test_app!(pool);

        // The stock line can go.
        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/stock-lines/{}", world.ul01_stock_line))
            .insert_header(testing::bearer(&world.referent))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        // The item is still referenced by the other stock line.
        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/items/{}", world.item))
            .insert_header(testing::bearer(&world.referent))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_out_of_range_pages() {
        let pool = test_pool().await;
        let world = World::seed(&pool).await;
        let app = crate::test_app!(pool);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/items?page={}", i64::MAX))
            .insert_header(testing::bearer(&world.viewer))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["page"], i64::MAX);
        assert_eq!(body["data"]["data"].as_array().unwrap().len(), 0);
        assert_eq!(body["data"]["total"], 1);

        let req = test::TestRequest::get()
            .uri("/api/v1/items?page=-5&per_page=1")
            .insert_header(testing::bearer(&world.viewer))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["page"], 1);
        assert_eq!(body["data"]["data"].as_array().unwrap().len(), 1);

        let req = test::TestRequest::get()
            .uri("/api/v1/items?page=abc")
            .insert_header(testing::bearer(&world.viewer))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_patch_null_clears_nullable_reference() {
        let pool = test_pool().await;
        let world = World::seed(&pool).await;
        let app = crate::test_app!(pool);
        let uri = format!("/api/v1/structures/{}", world.ul01);

        // Absent field: parent untouched.
        let req = test::TestRequest::patch()
            .uri(&uri)
            .insert_header(testing::bearer(&world.root))
            .set_json(json!({ "name": "UL Paris 1" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["name"], "UL Paris 1");
        assert_eq!(body["data"]["parent"], world.dt.as_str());

        // Explicit null: parent cleared.
        let req = test::TestRequest::patch()
            .uri(&uri)
            .insert_header(testing::bearer(&world.root))
            .set_json(json!({ "parent": null }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["data"]["parent"].is_null());
        assert_eq!(body["data"]["name"], "UL Paris 1");

        let req = test::TestRequest::patch()
            .uri(&uri)
            .insert_header(testing::bearer(&world.root))
            .set_json(json!({ "parent": world.dt }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["parent"], world.dt.as_str());
    }
}
