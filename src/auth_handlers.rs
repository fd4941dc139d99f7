// src/auth_handlers.rs - Registration, JWT issuance and user administration

use actix_web::{web, HttpResponse};
use chrono::Utc;
use validator::Validate;
use std::sync::Arc;
use sqlx::SqlitePool;

use crate::access::Requester;
use crate::auth::{
    self, AccessToken, AuthService, LoginRequest, RefreshRequest, RegisterRequest, TokenType,
    UpdateProfileRequest, UpdateUserRequest, User, UserInfo,
};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{ApiResponse, ListQuery, PaginatedResponse};
use crate::AppState;

const BAD_CREDENTIALS: &str = "No active account found with the given credentials";

fn require_staff(requester: &Requester) -> ApiResult<()> {
    requester.require_user()?;
    if !(requester.is_staff || requester.is_superuser) {
        return Err(ApiError::forbidden("Staff access required."));
    }
    Ok(())
}

async fn load_user(pool: &SqlitePool, id: &str) -> ApiResult<User> {
    User::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

async fn ensure_email_free(pool: &SqlitePool, email: &str, owner: &str) -> ApiResult<()> {
    match User::find_by_email(pool, email).await? {
        Some(other) if other.id != owner => {
            Err(ApiError::field("email", "A user with that email already exists."))
        }
        _ => Ok(()),
    }
}

async fn save_user(pool: &SqlitePool, user: &User) -> ApiResult<()> {
    sqlx::query(
        r#"UPDATE users SET
            email = ?, full_name = ?, role = ?, is_active = ?, is_staff = ?, is_superuser = ?, updated_at = ?
        WHERE id = ?"#,
    )
    .bind(&user.email)
    .bind(&user.full_name)
    .bind(user.role)
    .bind(user.is_active)
    .bind(user.is_staff)
    .bind(user.is_superuser)
    .bind(Utc::now())
    .bind(&user.id)
    .execute(pool)
    .await?;
    Ok(())
}

// ======== AUTH HANDLERS ========

pub async fn register(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let user = User::create(&app_state.db_pool, request.into_inner(), &auth_service, false, false).await?;
    log::info!("New user registered: {}", user.email);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        UserInfo::from(user),
        "User registered successfully".to_string(),
    )))
}

/// `POST /auth/jwt/create`: email and password for an access/refresh pair.
pub async fn create_token(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let pool = &app_state.db_pool;

    let user = match User::find_by_email(pool, request.email.trim()).await? {
        Some(user) if user.is_active && auth_service.verify_password(&request.password, &user.password_hash) => user,
        _ => {
            log::warn!("Failed login for {}", request.email);
            return Err(ApiError::Unauthorized(BAD_CREDENTIALS.to_string()));
        }
    };

    user.update_last_login(pool).await?;
    let tokens = auth_service.generate_tokens(&user)?;
    log::info!("User {} logged in", user.email);

    Ok(HttpResponse::Ok().json(ApiResponse::success(tokens)))
}

pub async fn refresh_token(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<RefreshRequest>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let token = request
        .refresh
        .as_deref()
        .ok_or_else(|| ApiError::field("refresh", "This field is required."))?;

    let claims = auth_service.verify_token(token, TokenType::Refresh)?;
    if auth::is_revoked(pool, &claims.jti).await? {
        log::warn!("Revoked refresh token presented for user {}", claims.sub);
        return Err(ApiError::Unauthorized("Token is blacklisted".to_string()));
    }

    let (user, _) = auth::load_requester(pool, &claims).await?;
    let access = auth_service.generate_access_token(&user)?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(AccessToken { access })))
}

/// Revokes the given refresh token. Requires a valid access token too.
pub async fn logout(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    requester: Requester,
    request: web::Json<RefreshRequest>,
) -> ApiResult<HttpResponse> {
    let user_id = requester.require_user()?;
    let token = request
        .refresh
        .as_deref()
        .ok_or_else(|| ApiError::field("refresh", "This field is required."))?;

    let claims = auth_service
        .verify_token(token, TokenType::Refresh)
        .map_err(|_| ApiError::bad_request("Invalid refresh token"))?;
    if claims.sub != user_id {
        return Err(ApiError::bad_request("Invalid refresh token"));
    }

    auth::revoke_token(&app_state.db_pool, &claims).await?;
    log::info!("User {} logged out", user_id);

    Ok(HttpResponse::NoContent().finish())
}

// ======== OWN PROFILE ========

pub async fn get_me(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
) -> ApiResult<HttpResponse> {
    let user = load_user(&app_state.db_pool, requester.require_user()?).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserInfo::from(user))))
}

pub async fn update_me(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    request: web::Json<UpdateProfileRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let pool = &app_state.db_pool;
    let request = request.into_inner();
    let mut user = load_user(pool, requester.require_user()?).await?;

    if let Some(email) = request.email {
        ensure_email_free(pool, email.trim(), &user.id).await?;
        user.email = email.trim().to_string();
    }
    if let Some(full_name) = request.full_name {
        user.full_name = full_name.trim().to_string();
    }

    save_user(pool, &user).await?;
    let user = load_user(pool, &user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserInfo::from(user))))
}

// ======== USER MANAGEMENT (STAFF) ========

pub async fn get_users(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    require_staff(&requester)?;
    let pool = &app_state.db_pool;
    let (page, per_page, offset) = query.normalize();

    let total = User::count(pool).await?;
    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?")
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let infos = users.into_iter().map(UserInfo::from).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse::new(infos, total, page, per_page))))
}

pub async fn get_user(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    require_staff(&requester)?;
    let user = load_user(&app_state.db_pool, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserInfo::from(user))))
}

pub async fn update_user(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    path: web::Path<String>,
    request: web::Json<UpdateUserRequest>,
) -> ApiResult<HttpResponse> {
    require_staff(&requester)?;
    request.validate()?;
    let pool = &app_state.db_pool;
    let request = request.into_inner();

    if request.is_superuser.is_some() && !requester.is_superuser {
        return Err(ApiError::forbidden("Only superusers may grant or revoke superuser status."));
    }

    let mut user = load_user(pool, &path.into_inner()).await?;
    if let Some(email) = request.email {
        ensure_email_free(pool, email.trim(), &user.id).await?;
        user.email = email.trim().to_string();
    }
    if let Some(full_name) = request.full_name {
        user.full_name = full_name.trim().to_string();
    }
    if let Some(role) = request.role {
        user.role = role;
    }
    if let Some(is_active) = request.is_active {
        user.is_active = is_active;
    }
    if let Some(is_staff) = request.is_staff {
        user.is_staff = is_staff;
    }
    if let Some(is_superuser) = request.is_superuser {
        user.is_superuser = is_superuser;
    }

    save_user(pool, &user).await?;
    log::info!("User {} updated by {:?}", user.id, requester.user_id);

    let user = load_user(pool, &user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserInfo::from(user))))
}

/// Deactivates; the row and everything pointing at it stay.
pub async fn delete_user(
    app_state: web::Data<Arc<AppState>>,
    requester: Requester,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    require_staff(&requester)?;
    let user_id = path.into_inner();

    if requester.user_id.as_deref() == Some(user_id.as_str()) {
        return Err(ApiError::bad_request("Cannot deactivate your own account"));
    }

    User::deactivate(&app_state.db_pool, &user_id).await?;
    log::info!("User {} deactivated by {:?}", user_id, requester.user_id);

    Ok(HttpResponse::NoContent().finish())
}
