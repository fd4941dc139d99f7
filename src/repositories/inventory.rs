// src/repositories/inventory.rs
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use crate::access::{hop, Hop, Ownership, Requester, STRUCTURES};
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use super::Repository;

pub const SESSION_PATH: &[Hop] = &[hop("structure_id", STRUCTURES)];
pub const LINE_PATH: &[Hop] = &[hop("session_id", "inventory_sessions"), hop("structure_id", STRUCTURES)];

// ==================== INVENTORY SESSION ====================

#[derive(Default)]
pub struct InventorySessionRepository;

impl InventorySessionRepository {
    /// Marks the session counted. Fails if it was already validated.
    pub async fn validate(&self, pool: &SqlitePool, id: &str, user_id: &str) -> ApiResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE inventory_sessions SET validated_at = ?, validated_by = ?, updated_at = ? \
             WHERE id = ? AND validated_at IS NULL",
        )
        .bind(now)
        .bind(user_id)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::bad_request("Inventory session is already validated"));
        }
        Ok(())
    }

    pub async fn lines(&self, pool: &SqlitePool, session_id: &str) -> ApiResult<Vec<InventoryLine>> {
        let lines = sqlx::query_as::<_, InventoryLine>(
            "SELECT * FROM inventory_lines WHERE session_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;
        Ok(lines)
    }
}

#[async_trait]
impl Repository for InventorySessionRepository {
    type Entity = InventorySession;
    type Create = CreateInventorySessionRequest;
    type Update = UpdateInventorySessionRequest;

    const TABLE: &'static str = "inventory_sessions";
    const NAME: &'static str = "Inventory session";
    const OWNERSHIP: Ownership = Ownership::Structure { path: SESSION_PATH, request_field: Some("structure") };

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO inventory_sessions (id, structure_id, container_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&data.structure)
        .bind(&data.container)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &InventorySession, patch: Self::Update) -> ApiResult<()> {
        sqlx::query("UPDATE inventory_sessions SET structure_id = ?, container_id = ?, updated_at = ? WHERE id = ?")
            .bind(patch.structure.as_deref().unwrap_or(&existing.structure_id))
            .bind(patch.container.as_deref().unwrap_or(&existing.container_id))
            .bind(Utc::now())
            .bind(&existing.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

// ==================== INVENTORY LINE ====================

#[derive(Default)]
pub struct InventoryLineRepository;

#[async_trait]
impl Repository for InventoryLineRepository {
    type Entity = InventoryLine;
    type Create = CreateInventoryLineRequest;
    type Update = UpdateInventoryLineRequest;

    const TABLE: &'static str = "inventory_lines";
    const NAME: &'static str = "Inventory line";
    const OWNERSHIP: Ownership = Ownership::Structure { path: LINE_PATH, request_field: Some("session") };

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO inventory_lines (
                id, session_id, item_id, expected_qty, counted_qty, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&data.session)
        .bind(&data.item)
        .bind(data.expected_qty.unwrap_or(0.0))
        .bind(data.counted_qty.unwrap_or(0.0))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &InventoryLine, patch: Self::Update) -> ApiResult<()> {
        sqlx::query(
            r#"UPDATE inventory_lines SET
                session_id = ?, item_id = ?, expected_qty = ?, counted_qty = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(patch.session.as_deref().unwrap_or(&existing.session_id))
        .bind(patch.item.as_deref().unwrap_or(&existing.item_id))
        .bind(patch.expected_qty.unwrap_or(existing.expected_qty))
        .bind(patch.counted_qty.unwrap_or(existing.counted_qty))
        .bind(Utc::now())
        .bind(&existing.id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
