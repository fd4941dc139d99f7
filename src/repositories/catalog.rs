// src/repositories/catalog.rs
//! Organization-wide reference data. None of it is structure-scoped.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use crate::access::{Ownership, Requester};
use crate::error::ApiResult;
use crate::models::*;
use crate::validator::{CustomValidate, ValidationResult};
use super::Repository;

// ==================== ITEM ====================

#[derive(Default)]
pub struct ItemRepository;

#[async_trait]
impl Repository for ItemRepository {
    type Entity = Item;
    type Create = CreateItemRequest;
    type Update = UpdateItemRequest;

    const TABLE: &'static str = "items";
    const NAME: &'static str = "Item";
    const OWNERSHIP: Ownership = Ownership::Global;

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO items (
                id, organization_id, name, sku, unit, category,
                is_consumable, requires_expiry, requires_lot_number, is_active,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&data.organization)
        .bind(data.name.trim())
        .bind(data.sku.as_deref().unwrap_or(""))
        .bind(data.unit.as_deref().unwrap_or(""))
        .bind(data.category.as_deref().unwrap_or(""))
        .bind(data.is_consumable.unwrap_or(true))
        .bind(data.requires_expiry.unwrap_or(false))
        .bind(data.requires_lot_number.unwrap_or(false))
        .bind(data.is_active.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &Item, patch: Self::Update) -> ApiResult<()> {
        sqlx::query(
            r#"UPDATE items SET
                name = ?, sku = ?, unit = ?, category = ?,
                is_consumable = ?, requires_expiry = ?, requires_lot_number = ?, is_active = ?,
                updated_at = ?
            WHERE id = ?"#,
        )
        .bind(patch.name.as_deref().map(str::trim).unwrap_or(&existing.name))
        .bind(patch.sku.as_deref().unwrap_or(&existing.sku))
        .bind(patch.unit.as_deref().unwrap_or(&existing.unit))
        .bind(patch.category.as_deref().unwrap_or(&existing.category))
        .bind(patch.is_consumable.unwrap_or(existing.is_consumable))
        .bind(patch.requires_expiry.unwrap_or(existing.requires_expiry))
        .bind(patch.requires_lot_number.unwrap_or(existing.requires_lot_number))
        .bind(patch.is_active.unwrap_or(existing.is_active))
        .bind(Utc::now())
        .bind(&existing.id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

// ==================== LOT TEMPLATE ====================

#[derive(Default)]
pub struct LotTemplateRepository;

#[async_trait]
impl Repository for LotTemplateRepository {
    type Entity = LotTemplate;
    type Create = CreateLotTemplateRequest;
    type Update = UpdateLotTemplateRequest;

    const TABLE: &'static str = "lot_templates";
    const NAME: &'static str = "Lot template";
    const OWNERSHIP: Ownership = Ownership::Global;

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO lot_templates (
                id, organization_id, code, name, version, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&data.organization)
        .bind(data.code)
        .bind(data.name.trim())
        .bind(data.version.as_deref().unwrap_or(""))
        .bind(data.is_active.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &LotTemplate, patch: Self::Update) -> ApiResult<()> {
        sqlx::query(
            "UPDATE lot_templates SET code = ?, name = ?, version = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(patch.code.unwrap_or(existing.code))
        .bind(patch.name.as_deref().map(str::trim).unwrap_or(&existing.name))
        .bind(patch.version.as_deref().unwrap_or(&existing.version))
        .bind(patch.is_active.unwrap_or(existing.is_active))
        .bind(Utc::now())
        .bind(&existing.id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

// ==================== LOT TEMPLATE ITEM ====================

#[derive(Default)]
pub struct LotTemplateItemRepository;

#[async_trait]
impl Repository for LotTemplateItemRepository {
    type Entity = LotTemplateItem;
    type Create = CreateLotTemplateItemRequest;
    type Update = UpdateLotTemplateItemRequest;

    const TABLE: &'static str = "lot_template_items";
    const NAME: &'static str = "Lot template item";
    const OWNERSHIP: Ownership = Ownership::Global;

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO lot_template_items (
                id, template_id, "group", item_id, expected_qty, notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&data.template)
        .bind(data.group)
        .bind(&data.item)
        .bind(data.expected_qty)
        .bind(data.notes.as_deref().unwrap_or(""))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &LotTemplateItem, patch: Self::Update) -> ApiResult<()> {
        sqlx::query(
            r#"UPDATE lot_template_items SET
                "group" = ?, item_id = ?, expected_qty = ?, notes = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(patch.group.unwrap_or(existing.group))
        .bind(patch.item.as_deref().unwrap_or(&existing.item_id))
        .bind(patch.expected_qty.unwrap_or(existing.expected_qty))
        .bind(patch.notes.as_deref().unwrap_or(&existing.notes))
        .bind(Utc::now())
        .bind(&existing.id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

// ==================== BATCH ====================

#[derive(Default)]
pub struct BatchRepository;

#[async_trait]
impl Repository for BatchRepository {
    type Entity = Batch;
    type Create = CreateBatchRequest;
    type Update = UpdateBatchRequest;

    const TABLE: &'static str = "batches";
    const NAME: &'static str = "Batch";
    const OWNERSHIP: Ownership = Ownership::Global;

    fn check_create(&self, data: &CreateBatchRequest) -> ValidationResult {
        data.custom_validate()
    }

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO batches (id, item_id, lot_number, expires_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&data.item)
        .bind(data.lot_number.as_deref().unwrap_or(""))
        .bind(data.expires_at)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &Batch, patch: Self::Update) -> ApiResult<()> {
        sqlx::query("UPDATE batches SET lot_number = ?, expires_at = ?, updated_at = ? WHERE id = ?")
            .bind(patch.lot_number.as_deref().unwrap_or(&existing.lot_number))
            .bind(merge_nullable(&patch.expires_at, &existing.expires_at))
            .bind(Utc::now())
            .bind(&existing.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
