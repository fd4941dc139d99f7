// src/models/organization.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumString};

use super::nullable;

use crate::validator::{validate_not_blank, validate_slug};

// === ENUMS ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Display, EnumString, AsRefStr)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StructureLevel {
    National,
    Territorial,
    Local,
}

/// Role held by a member inside one structure. Not inherited by child structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Display, EnumString, AsRefStr)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipRole {
    Viewer,
    Referent,
    Admin,
}

impl MembershipRole {
    /// Roles allowed to mutate structure-scoped data.
    pub const WRITERS: &'static [MembershipRole] = &[MembershipRole::Referent, MembershipRole::Admin];

    pub fn display_name(&self) -> &'static str {
        match self {
            MembershipRole::Viewer => "Viewer",
            MembershipRole::Referent => "Equipment referent",
            MembershipRole::Admin => "Structure administrator",
        }
    }
}

impl Default for MembershipRole {
    fn default() -> Self {
        MembershipRole::Viewer
    }
}

/// First-aid qualification level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Display, EnumString, AsRefStr)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Grade {
    Stagiaire,
    Pse1,
    Pse2,
    Ci,
    Cdpe,
    Cdmge,
}

impl Default for Grade {
    fn default() -> Self {
        Grade::Stagiaire
    }
}

// === ORGANIZATION ===

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(min = 1, max = 50, message = "Slug must be between 1 and 50 characters"))]
    #[validate(custom(function = "validate_slug"))]
    pub slug: String,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Slug must be between 1 and 50 characters"))]
    #[validate(custom(function = "validate_slug"))]
    pub slug: Option<String>,
    pub is_active: Option<bool>,
}

// === STRUCTURE ===

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Structure {
    pub id: String,
    #[serde(rename = "organization")]
    pub organization_id: String,
    pub level: StructureLevel,
    pub name: String,
    #[serde(rename = "parent")]
    pub parent_id: Option<String>,
    pub code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateStructureRequest {
    pub organization: String,
    pub level: StructureLevel,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    pub parent: Option<String>,
    #[validate(length(max = 64, message = "Code cannot exceed 64 characters"))]
    pub code: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateStructureRequest {
    pub level: Option<StructureLevel>,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent: Option<Option<String>>,
    #[validate(length(max = 64, message = "Code cannot exceed 64 characters"))]
    pub code: Option<String>,
    pub is_active: Option<bool>,
}

// === MEMBERSHIP ===

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Membership {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    #[serde(rename = "structure")]
    pub structure_id: String,
    pub role: MembershipRole,
    pub grade: Grade,
    pub is_fc_up_to_date: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateMembershipRequest {
    pub user: String,
    pub structure: String,
    pub role: Option<MembershipRole>,
    pub grade: Option<Grade>,
    pub is_fc_up_to_date: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateMembershipRequest {
    pub role: Option<MembershipRole>,
    pub grade: Option<Grade>,
    pub is_fc_up_to_date: Option<bool>,
    pub is_active: Option<bool>,
}
