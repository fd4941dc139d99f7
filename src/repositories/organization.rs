// src/repositories/organization.rs
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use crate::access::{hop, Hop, Ownership, Requester, STRUCTURES};
use crate::error::ApiResult;
use crate::models::*;
use crate::validator::{BusinessValidator, ValidationResult};
use super::Repository;

// ==================== ORGANIZATION ====================

#[derive(Default)]
pub struct OrganizationRepository;

#[async_trait]
impl Repository for OrganizationRepository {
    type Entity = Organization;
    type Create = CreateOrganizationRequest;
    type Update = UpdateOrganizationRequest;

    const TABLE: &'static str = "organizations";
    const NAME: &'static str = "Organization";
    const OWNERSHIP: Ownership = Ownership::Global;
    const SUPERUSER_WRITES: bool = true;

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO organizations (id, name, slug, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(data.name.trim())
        .bind(&data.slug)
        .bind(data.is_active.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &Organization, patch: Self::Update) -> ApiResult<()> {
        sqlx::query("UPDATE organizations SET name = ?, slug = ?, is_active = ?, updated_at = ? WHERE id = ?")
            .bind(patch.name.as_deref().map(str::trim).unwrap_or(&existing.name))
            .bind(patch.slug.as_deref().unwrap_or(&existing.slug))
            .bind(patch.is_active.unwrap_or(existing.is_active))
            .bind(Utc::now())
            .bind(&existing.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

// ==================== STRUCTURE ====================

/// A structure owns itself.
const STRUCTURE_PATH: &[Hop] = &[hop("id", STRUCTURES)];

#[derive(Default)]
pub struct StructureRepository;

#[async_trait]
impl Repository for StructureRepository {
    type Entity = Structure;
    type Create = CreateStructureRequest;
    type Update = UpdateStructureRequest;

    const TABLE: &'static str = STRUCTURES;
    const NAME: &'static str = "Structure";
    const OWNERSHIP: Ownership = Ownership::Structure { path: STRUCTURE_PATH, request_field: None };
    const SUPERUSER_WRITES: bool = true;

    fn check_update(&self, existing: &Structure, patch: &UpdateStructureRequest) -> ValidationResult {
        BusinessValidator::structure_parent(&existing.id, patch.parent.as_ref().and_then(|p| p.as_deref()))
    }

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO structures (
                id, organization_id, level, name, parent_id, code, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&data.organization)
        .bind(data.level)
        .bind(data.name.trim())
        .bind(&data.parent)
        .bind(data.code.as_deref().unwrap_or(""))
        .bind(data.is_active.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &Structure, patch: Self::Update) -> ApiResult<()> {
        sqlx::query(
            "UPDATE structures SET level = ?, name = ?, parent_id = ?, code = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(patch.level.unwrap_or(existing.level))
        .bind(patch.name.as_deref().map(str::trim).unwrap_or(&existing.name))
        .bind(merge_nullable(&patch.parent, &existing.parent_id))
        .bind(patch.code.as_deref().unwrap_or(&existing.code))
        .bind(patch.is_active.unwrap_or(existing.is_active))
        .bind(Utc::now())
        .bind(&existing.id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

// ==================== MEMBERSHIP ====================

const MEMBERSHIP_PATH: &[Hop] = &[hop("structure_id", STRUCTURES)];

#[derive(Default)]
pub struct MembershipRepository;

impl MembershipRepository {
    pub async fn list_for_user(&self, pool: &SqlitePool, user_id: &str) -> ApiResult<Vec<Membership>> {
        let rows = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE user_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl Repository for MembershipRepository {
    type Entity = Membership;
    type Create = CreateMembershipRequest;
    type Update = UpdateMembershipRequest;

    const TABLE: &'static str = "memberships";
    const NAME: &'static str = "Membership";
    const OWNERSHIP: Ownership = Ownership::Structure {
        path: MEMBERSHIP_PATH,
        request_field: Some("structure"),
    };
    const SUPERUSER_WRITES: bool = true;

    async fn insert(&self, pool: &SqlitePool, id: &str, data: Self::Create, _requester: &Requester) -> ApiResult<()> {
        sqlx::query(
            r#"INSERT INTO memberships (
                id, user_id, structure_id, role, grade, is_fc_up_to_date, is_active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&data.user)
        .bind(&data.structure)
        .bind(data.role.unwrap_or_default())
        .bind(data.grade.unwrap_or_default())
        .bind(data.is_fc_up_to_date.unwrap_or(false))
        .bind(data.is_active.unwrap_or(true))
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pool: &SqlitePool, existing: &Membership, patch: Self::Update) -> ApiResult<()> {
        sqlx::query("UPDATE memberships SET role = ?, grade = ?, is_fc_up_to_date = ?, is_active = ? WHERE id = ?")
            .bind(patch.role.unwrap_or(existing.role))
            .bind(patch.grade.unwrap_or(existing.grade))
            .bind(patch.is_fc_up_to_date.unwrap_or(existing.is_fc_up_to_date))
            .bind(patch.is_active.unwrap_or(existing.is_active))
            .bind(&existing.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
