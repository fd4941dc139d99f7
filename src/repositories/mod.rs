// src/repositories/mod.rs
//! Storage for each collection behind one trait, so the HTTP layer stays generic.

pub mod catalog;
pub mod inventory;
pub mod organization;
pub mod site;
pub mod stock;

pub use catalog::*;
pub use inventory::*;
pub use organization::*;
pub use site::*;
pub use stock::*;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteRow;
use serde::{Serialize, de::DeserializeOwned};
use validator::Validate;
use crate::access::{ListScope, Ownership, Requester};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{ListQuery, PaginatedResponse};
use crate::validator::ValidationResult;

/// CRUD storage plus the collection's scoping declaration.
#[async_trait]
pub trait Repository: Default + Send + Sync + 'static {
    type Entity: Serialize + Send + Sync + Unpin + for<'r> sqlx::FromRow<'r, SqliteRow> + 'static;
    type Create: DeserializeOwned + Serialize + Validate + Send + Sync + 'static;
    type Update: DeserializeOwned + Serialize + Validate + Send + Sync + 'static;

    /// Table name in the database
    const TABLE: &'static str;
    /// Human readable name for messages
    const NAME: &'static str;
    const OWNERSHIP: Ownership;
    /// Create/update/delete restricted to superusers.
    const SUPERUSER_WRITES: bool = false;

    /// Cross-field rules for a new row.
    fn check_create(&self, _data: &Self::Create) -> ValidationResult {
        ValidationResult::new()
    }

    /// Cross-field rules for the row an update would produce.
    fn check_update(&self, _existing: &Self::Entity, _patch: &Self::Update) -> ValidationResult {
        ValidationResult::new()
    }

    async fn insert(
        &self,
        pool: &SqlitePool,
        id: &str,
        data: Self::Create,
        requester: &Requester,
    ) -> ApiResult<()>;

    async fn update(&self, pool: &SqlitePool, existing: &Self::Entity, patch: Self::Update) -> ApiResult<()>;

    async fn get_by_id(&self, pool: &SqlitePool, id: &str) -> ApiResult<Option<Self::Entity>> {
        let query = format!("SELECT * FROM {} WHERE id = ?", Self::TABLE);
        let result = sqlx::query_as::<_, Self::Entity>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(result)
    }

    async fn fetch(&self, pool: &SqlitePool, id: &str) -> ApiResult<Self::Entity> {
        self.get_by_id(pool, id)
            .await?
            .ok_or_else(|| ApiError::not_found(Self::NAME))
    }

    async fn delete(&self, pool: &SqlitePool, id: &str) -> ApiResult<()> {
        let query = format!("DELETE FROM {} WHERE id = ?", Self::TABLE);
        let result = sqlx::query(&query)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(Self::NAME));
        }
        Ok(())
    }

    /// Page of rows visible under `scope`, oldest first.
    async fn list(
        &self,
        pool: &SqlitePool,
        scope: &ListScope,
        query: &ListQuery,
    ) -> ApiResult<PaginatedResponse<Self::Entity>> {
        let (page, per_page, offset) = query.normalize();

        let (condition, params) = match scope {
            ListScope::Nothing => return Ok(PaginatedResponse::empty(page, per_page)),
            ListScope::All => (String::new(), Vec::new()),
            ListScope::Structures(ids) => {
                let path = Self::OWNERSHIP.path().unwrap_or(&[]);
                let condition = crate::access::ownership::scope_condition(path, ids.len());
                (format!(" WHERE {}", condition), ids.clone())
            }
        };

        let count_sql = format!("SELECT COUNT(*) FROM {}{}", Self::TABLE, condition);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total = count_query.fetch_one(pool).await?;

        let select_sql = format!(
            "SELECT * FROM {}{} ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
            Self::TABLE,
            condition
        );
        let mut select_query = sqlx::query_as::<_, Self::Entity>(&select_sql);
        for param in &params {
            select_query = select_query.bind(param);
        }
        let data = select_query.bind(per_page).bind(offset).fetch_all(pool).await?;

        Ok(PaginatedResponse::new(data, total, page, per_page))
    }
}
