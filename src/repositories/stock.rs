// src/repositories/stock.rs
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use crate::access::{hop, Hop, Ownership, Requester, STRUCTURES};
use crate::error::ApiResult;
use crate::models::*;
use crate::validator::{BusinessValidator, CustomValidate, ValidationResult};
use super::Repository;

pub const LOT_INSTANCE_PATH: &[Hop] = &[hop("container_id", "containers"), hop("structure_id", STRUCTURES)];
pub const STOCK_LINE_PATH: &[Hop] = &[
    hop("lot_instance_id", "lot_instances"),
    hop("container_id", "containers"),
    hop("structure_id", STRUCTURES),
];
pub const STOCK_MOVEMENT_PATH: &[Hop] = &[hop("structure_id", STRUCTURES)];

// ==================== LOT INSTANCE ====================

#[derive(Default)]
pub struct LotInstanceRepository;

#[async_trait]
impl Repository for LotInstanceRepository {
    type Entity = LotInstance;
    type Create = CreateLotInstanceRequest;
    type Update = UpdateLotInstanceRequest;

    const TABLE: &'static str = "lot_instances";
    const NAME: &'static str = "Lot instance";
    const OWNERSHIP: Ownership = Ownership::Structure {
        path: LOT_INSTANCE_PATH,
        request_field: Some("container"),
    };

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO lot_instances (
                id, template_id, container_id, last_checked_at, next_check_due_at, status,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&data.template)
        .bind(&data.container)
        .bind(data.last_checked_at)
        .bind(data.next_check_due_at)
        .bind(data.status.as_deref().unwrap_or(DEFAULT_LOT_STATUS))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &LotInstance, patch: Self::Update) -> ApiResult<()> {
        sqlx::query(
            r#"UPDATE lot_instances SET
                template_id = ?, container_id = ?, last_checked_at = ?, next_check_due_at = ?,
                status = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(patch.template.as_deref().unwrap_or(&existing.template_id))
        .bind(patch.container.as_deref().unwrap_or(&existing.container_id))
        .bind(merge_nullable(&patch.last_checked_at, &existing.last_checked_at))
        .bind(merge_nullable(&patch.next_check_due_at, &existing.next_check_due_at))
        .bind(patch.status.as_deref().unwrap_or(&existing.status))
        .bind(Utc::now())
        .bind(&existing.id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

// ==================== STOCK LINE ====================

#[derive(Default)]
pub struct StockLineRepository;

#[async_trait]
impl Repository for StockLineRepository {
    type Entity = StockLine;
    type Create = CreateStockLineRequest;
    type Update = UpdateStockLineRequest;

    const TABLE: &'static str = "stock_lines";
    const NAME: &'static str = "Stock line";
    const OWNERSHIP: Ownership = Ownership::Structure {
        path: STOCK_LINE_PATH,
        request_field: Some("lot_instance"),
    };

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO stock_lines (
                id, lot_instance_id, item_id, batch_id, quantity, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&data.lot_instance)
        .bind(&data.item)
        .bind(&data.batch)
        .bind(data.quantity.unwrap_or(0.0))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &StockLine, patch: Self::Update) -> ApiResult<()> {
        sqlx::query(
            r#"UPDATE stock_lines SET
                lot_instance_id = ?, item_id = ?, batch_id = ?, quantity = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(patch.lot_instance.as_deref().unwrap_or(&existing.lot_instance_id))
        .bind(patch.item.as_deref().unwrap_or(&existing.item_id))
        .bind(merge_nullable(&patch.batch, &existing.batch_id))
        .bind(patch.quantity.unwrap_or(existing.quantity))
        .bind(Utc::now())
        .bind(&existing.id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

// ==================== STOCK MOVEMENT ====================

#[derive(Default)]
pub struct StockMovementRepository;

#[async_trait]
impl Repository for StockMovementRepository {
    type Entity = StockMovement;
    type Create = CreateStockMovementRequest;
    type Update = UpdateStockMovementRequest;

    const TABLE: &'static str = "stock_movements";
    const NAME: &'static str = "Stock movement";
    const OWNERSHIP: Ownership = Ownership::Structure {
        path: STOCK_MOVEMENT_PATH,
        request_field: Some("structure"),
    };

    fn check_create(&self, data: &CreateStockMovementRequest) -> ValidationResult {
        data.custom_validate()
    }

    fn check_update(&self, existing: &StockMovement, patch: &UpdateStockMovementRequest) -> ValidationResult {
        BusinessValidator::movement_update(existing, patch)
    }

    /// `created_by` always comes from the requester.
    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO stock_movements (
                id, structure_id, created_by, movement_type, from_lot_id, to_lot_id,
                item_id, batch_id, quantity, reason, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&data.structure)
        .bind(&requester.user_id)
        .bind(data.movement_type)
        .bind(&data.from_lot)
        .bind(&data.to_lot)
        .bind(&data.item)
        .bind(&data.batch)
        .bind(data.quantity)
        .bind(data.reason.as_deref().unwrap_or(""))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &StockMovement, patch: Self::Update) -> ApiResult<()> {
        sqlx::query(
            r#"UPDATE stock_movements SET
                structure_id = ?, movement_type = ?, from_lot_id = ?, to_lot_id = ?,
                item_id = ?, batch_id = ?, quantity = ?, reason = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(patch.structure.as_deref().unwrap_or(&existing.structure_id))
        .bind(patch.movement_type.unwrap_or(existing.movement_type))
        .bind(merge_nullable(&patch.from_lot, &existing.from_lot_id))
        .bind(merge_nullable(&patch.to_lot, &existing.to_lot_id))
        .bind(patch.item.as_deref().unwrap_or(&existing.item_id))
        .bind(merge_nullable(&patch.batch, &existing.batch_id))
        .bind(patch.quantity.unwrap_or(existing.quantity))
        .bind(patch.reason.as_deref().unwrap_or(&existing.reason))
        .bind(Utc::now())
        .bind(&existing.id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
