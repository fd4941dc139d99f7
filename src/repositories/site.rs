// src/repositories/site.rs
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use crate::access::{hop, Hop, Ownership, Requester, STRUCTURES};
use crate::error::ApiResult;
use crate::models::*;
use super::Repository;

pub const SITE_PATH: &[Hop] = &[hop("structure_id", STRUCTURES)];
pub const LOCATION_PATH: &[Hop] = &[hop("site_id", "sites"), hop("structure_id", STRUCTURES)];
pub const CONTAINER_PATH: &[Hop] = &[hop("structure_id", STRUCTURES)];

// ==================== SITE ====================

#[derive(Default)]
pub struct SiteRepository;

#[async_trait]
impl Repository for SiteRepository {
    type Entity = Site;
    type Create = CreateSiteRequest;
    type Update = UpdateSiteRequest;

    const TABLE: &'static str = "sites";
    const NAME: &'static str = "Site";
    const OWNERSHIP: Ownership = Ownership::Structure { path: SITE_PATH, request_field: Some("structure") };

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO sites (id, structure_id, name, address, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&data.structure)
        .bind(data.name.trim())
        .bind(data.address.as_deref().unwrap_or(""))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &Site, patch: Self::Update) -> ApiResult<()> {
        sqlx::query("UPDATE sites SET structure_id = ?, name = ?, address = ?, updated_at = ? WHERE id = ?")
            .bind(patch.structure.as_deref().unwrap_or(&existing.structure_id))
            .bind(patch.name.as_deref().map(str::trim).unwrap_or(&existing.name))
            .bind(patch.address.as_deref().unwrap_or(&existing.address))
            .bind(Utc::now())
            .bind(&existing.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

// ==================== LOCATION ====================

#[derive(Default)]
pub struct LocationRepository;

#[async_trait]
impl Repository for LocationRepository {
    type Entity = Location;
    type Create = CreateLocationRequest;
    type Update = UpdateLocationRequest;

    const TABLE: &'static str = "locations";
    const NAME: &'static str = "Location";
    const OWNERSHIP: Ownership = Ownership::Structure { path: LOCATION_PATH, request_field: Some("site") };

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO locations (id, site_id, name, location_type, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&data.site)
        .bind(data.name.trim())
        .bind(data.location_type.as_deref().unwrap_or(""))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &Location, patch: Self::Update) -> ApiResult<()> {
        sqlx::query("UPDATE locations SET site_id = ?, name = ?, location_type = ?, updated_at = ? WHERE id = ?")
            .bind(patch.site.as_deref().unwrap_or(&existing.site_id))
            .bind(patch.name.as_deref().map(str::trim).unwrap_or(&existing.name))
            .bind(patch.location_type.as_deref().unwrap_or(&existing.location_type))
            .bind(Utc::now())
            .bind(&existing.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

// ==================== CONTAINER ====================

#[derive(Default)]
pub struct ContainerRepository;

#[async_trait]
impl Repository for ContainerRepository {
    type Entity = Container;
    type Create = CreateContainerRequest;
    type Update = UpdateContainerRequest;

    const TABLE: &'static str = "containers";
    const NAME: &'static str = "Container";
    const OWNERSHIP: Ownership = Ownership::Structure { path: CONTAINER_PATH, request_field: Some("structure") };

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO containers (
                id, structure_id, location_id, container_type, identifier, label, is_active,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&data.structure)
        .bind(&data.location)
        .bind(data.container_type)
        .bind(data.identifier.trim())
        .bind(data.label.as_deref().unwrap_or(""))
        .bind(data.is_active.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &Container, patch: Self::Update) -> ApiResult<()> {
        sqlx::query(
            r#"UPDATE containers SET
                structure_id = ?, location_id = ?, container_type = ?, identifier = ?, label = ?,
                is_active = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(patch.structure.as_deref().unwrap_or(&existing.structure_id))
        .bind(merge_nullable(&patch.location, &existing.location_id))
        .bind(patch.container_type.unwrap_or(existing.container_type))
        .bind(patch.identifier.as_deref().map(str::trim).unwrap_or(&existing.identifier))
        .bind(patch.label.as_deref().unwrap_or(&existing.label))
        .bind(patch.is_active.unwrap_or(existing.is_active))
        .bind(Utc::now())
        .bind(&existing.id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
