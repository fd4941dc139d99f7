use bcrypt::{hash, verify};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;
use std::future::{ready, Ready};
use std::sync::Arc;
use actix_web::web;
use actix_web::HttpMessage;
use validator::Validate;
use actix_web::{dev::Payload, dev::ServiceRequest, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use strum::{AsRefStr, Display, EnumString};
use crate::access::Requester;
use crate::config::AuthConfig;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

// ======== USER MODEL ========

/// Organization-wide profile label. Access to structure data is decided by
/// memberships alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, Display, EnumString, AsRefStr)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    AdminGlobal,
    Referent,
    #[default]
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ======== REQUEST/RESPONSE STRUCTS ========

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(max = 255, message = "Full name cannot exceed 255 characters"))]
    #[serde(default)]
    pub full_name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[validate(length(max = 255, message = "Full name cannot exceed 255 characters"))]
    pub full_name: Option<String>,
}

/// Staff-side user edit. `is_superuser` is only honoured for superusers.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[validate(length(max = 255, message = "Full name cannot exceed 255 characters"))]
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            is_active: user.is_active,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct AccessToken {
    pub access: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    pub token_type: TokenType,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

// ======== AUTH SERVICE ========

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_lifetime: Duration::minutes(config.access_token_minutes),
            refresh_lifetime: Duration::days(config.refresh_token_days),
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    pub fn hash_password(&self, password: &str) -> ApiResult<String> {
        hash(password, self.bcrypt_cost)
            .map_err(|_| ApiError::InternalServerError("Failed to hash password".to_string()))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        verify(password, hash).unwrap_or(false)
    }

    fn issue(&self, user: &User, token_type: TokenType, lifetime: Duration) -> ApiResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            token_type,
            jti: Uuid::new_v4().to_string(),
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| ApiError::InternalServerError("Failed to generate token".to_string()))
    }

    pub fn generate_access_token(&self, user: &User) -> ApiResult<String> {
        self.issue(user, TokenType::Access, self.access_lifetime)
    }

    pub fn generate_refresh_token(&self, user: &User) -> ApiResult<String> {
        self.issue(user, TokenType::Refresh, self.refresh_lifetime)
    }

    pub fn generate_tokens(&self, user: &User) -> ApiResult<TokenPair> {
        Ok(TokenPair {
            access: self.generate_access_token(user)?,
            refresh: self.generate_refresh_token(user)?,
            user: user.clone().into(),
        })
    }

    pub fn verify_token(&self, token: &str, expected: TokenType) -> ApiResult<Claims> {
        let validation = Validation::default();
        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::Unauthorized("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    ApiError::Unauthorized("Invalid token".to_string())
                }
                _ => ApiError::Unauthorized("Token verification failed".to_string()),
            })?;

        if claims.token_type != expected {
            return Err(ApiError::Unauthorized("Token has wrong type".to_string()));
        }
        Ok(claims)
    }
}

// ======== USER METHODS ========

impl User {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower(?)")
            .bind(email)
            .fetch_optional(pool)
            .await?;
        Ok(user)
    }

    pub async fn create(
        pool: &SqlitePool,
        request: RegisterRequest,
        auth_service: &AuthService,
        is_staff: bool,
        is_superuser: bool,
    ) -> ApiResult<User> {
        if Self::find_by_email(pool, &request.email).await?.is_some() {
            return Err(ApiError::field("email", "A user with that email already exists."));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: request.email.trim().to_string(),
            full_name: request.full_name.trim().to_string(),
            password_hash: auth_service.hash_password(&request.password)?,
            role: if is_superuser { UserRole::AdminGlobal } else { UserRole::Member },
            is_active: true,
            is_staff,
            is_superuser,
            last_login: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"INSERT INTO users (
                id, email, full_name, password_hash, role, is_active, is_staff, is_superuser,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(pool)
        .await?;

        Ok(user)
    }

    pub async fn update_last_login(&self, pool: &SqlitePool) -> ApiResult<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Users are never removed; every reference to them stays valid.
    pub async fn deactivate(pool: &SqlitePool, id: &str) -> ApiResult<()> {
        let result = sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("User"));
        }
        Ok(())
    }

    pub async fn count(pool: &SqlitePool) -> ApiResult<i64> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await?;
        Ok(total)
    }
}

// ======== REFRESH TOKEN REVOCATION ========

pub async fn revoke_token(pool: &SqlitePool, claims: &Claims) -> ApiResult<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO revoked_tokens (jti, user_id, expires_at, revoked_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&claims.jti)
    .bind(&claims.sub)
    .bind(claims.expires_at())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn is_revoked(pool: &SqlitePool, jti: &str) -> ApiResult<bool> {
    let found: Option<String> = sqlx::query_scalar("SELECT jti FROM revoked_tokens WHERE jti = ?")
        .bind(jti)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

// ======== HELPER FUNCTIONS ========

/// Handlers take `Requester` as an argument; the JWT middleware stores it.
impl FromRequest for Requester {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let requester = req.extensions().get::<Requester>().cloned();
        ready(requester.ok_or_else(|| {
            ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
        }))
    }
}

/// Verified claims to an active stored user and their memberships.
pub async fn load_requester(pool: &SqlitePool, claims: &Claims) -> ApiResult<(User, Requester)> {
    let user = match User::find_by_id(pool, &claims.sub).await? {
        Some(user) if user.is_active => user,
        Some(_) => return Err(ApiError::Unauthorized("User account is disabled".to_string())),
        None => return Err(ApiError::Unauthorized("User not found".to_string())),
    };
    let requester = Requester::for_user(pool, &user).await?;
    Ok((user, requester))
}

// ======== JWT MIDDLEWARE ========

pub async fn jwt_middleware(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let token = credentials.token();

    let (auth_service, app_state) = match (
        req.app_data::<web::Data<Arc<AuthService>>>(),
        req.app_data::<web::Data<Arc<AppState>>>(),
    ) {
        (Some(svc), Some(state)) => (svc.clone(), state.clone()),
        _ => {
            log::error!("AuthService or AppState not found in app data");
            return Err((
                ApiError::InternalServerError("Auth service not available".to_string()).into(),
                req,
            ));
        }
    };

    let claims = match auth_service.verify_token(token, TokenType::Access) {
        Ok(claims) => claims,
        Err(err) => {
            log::warn!("JWT verification failed: {}", err);
            return Err((err.into(), req));
        }
    };

    match load_requester(&app_state.db_pool, &claims).await {
        Ok((_, requester)) => {
            req.extensions_mut().insert(requester);
            Ok(req)
        }
        Err(err) => {
            log::warn!("Rejected token for user {}: {}", claims.sub, err);
            Err((err.into(), req))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::testing;

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let service = AuthService::new(&testing::test_config().auth);
        let now = Utc::now();
        let user = User {
            id: "u1".into(),
            email: "a@b.org".into(),
            full_name: String::new(),
            password_hash: String::new(),
            role: UserRole::Referent,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            last_login: None,
            created_at: now,
            updated_at: now,
        };

        let access = service.generate_access_token(&user).unwrap();
        let refresh = service.generate_refresh_token(&user).unwrap();

        let claims = service.verify_token(&access, TokenType::Access).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, UserRole::Referent);
        assert!(service.verify_token(&refresh, TokenType::Access).is_err());
        assert!(service.verify_token(&access, TokenType::Refresh).is_err());
        assert!(service.verify_token("not-a-jwt", TokenType::Access).is_err());

        let other = AuthService::new(&crate::config::AuthConfig {
            jwt_secret: "x".repeat(40),
            ..testing::test_config().auth
        });
        assert!(other.verify_token(&access, TokenType::Access).is_err());
    }

    #[test]
    fn test_password_hashing() {
        let service = AuthService::new(&testing::test_config().auth);
        let hashed = service.hash_password("correct horse").unwrap();
        assert!(service.verify_password("correct horse", &hashed));
        assert!(!service.verify_password("battery staple", &hashed));
        assert!(!service.verify_password("anything", "not-a-hash"));
    }

    #[actix_rt::test]
    async fn test_deactivated_user_is_rejected() {
        let pool = test_pool().await;
        let service = AuthService::new(&testing::test_config().auth);
        let user = testing::create_user(&pool, "gone@crf.org", false).await;
        let token = service.generate_access_token(&user).unwrap();
        let claims = service.verify_token(&token, TokenType::Access).unwrap();

        assert!(load_requester(&pool, &claims).await.is_ok());
        User::deactivate(&pool, &user.id).await.unwrap();
        assert!(matches!(load_requester(&pool, &claims).await, Err(ApiError::Unauthorized(_))));
    }

    #[actix_rt::test]
    async fn test_revocation_roundtrip() {
        let pool = test_pool().await;
        let service = AuthService::new(&testing::test_config().auth);
        let user = testing::create_user(&pool, "r@crf.org", false).await;
        let refresh = service.generate_refresh_token(&user).unwrap();
        let claims = service.verify_token(&refresh, TokenType::Refresh).unwrap();

        assert!(!is_revoked(&pool, &claims.jti).await.unwrap());
        revoke_token(&pool, &claims).await.unwrap();
        revoke_token(&pool, &claims).await.unwrap();
        assert!(is_revoked(&pool, &claims.jti).await.unwrap());
    }

    #[actix_rt::test]
    async fn test_duplicate_email_rejected() {
        let pool = test_pool().await;
        let service = AuthService::new(&testing::test_config().auth);
        let request = || RegisterRequest {
            email: "dup@crf.org".into(),
            full_name: "Dup".into(),
            password: "password123".into(),
        };
        User::create(&pool, request(), &service, false, false).await.unwrap();
        let err = User::create(&pool, request(), &service, false, false).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(ref f) if f.contains_key("email")));
    }
}
