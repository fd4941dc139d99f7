// src/models/site.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumString};

use super::nullable;

use crate::validator::validate_not_blank;

// ==================== SITE ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Site {
    pub id: String,
    #[serde(rename = "structure")]
    pub structure_id: String,
    pub name: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateSiteRequest {
    pub structure: String,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(max = 2000, message = "Address cannot exceed 2000 characters"))]
    pub address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateSiteRequest {
    pub structure: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 2000, message = "Address cannot exceed 2000 characters"))]
    pub address: Option<String>,
}

// ==================== LOCATION ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Location {
    pub id: String,
    #[serde(rename = "site")]
    pub site_id: String,
    pub name: String,
    pub location_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateLocationRequest {
    pub site: String,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(max = 64, message = "Location type cannot exceed 64 characters"))]
    pub location_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateLocationRequest {
    pub site: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 64, message = "Location type cannot exceed 64 characters"))]
    pub location_type: Option<String>,
}

// ==================== CONTAINER ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString, AsRefStr)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerType {
    BagIntervention,
    BagOxy,
    BagFirstAid,
    VehicleVpsp,
    OxygenCylinder,
    ReserveCase,
    Other,
}

impl ContainerType {
    pub fn display_name(&self) -> &'static str {
        match self {
            ContainerType::BagIntervention => "Intervention bag",
            ContainerType::BagOxy => "Oxygen therapy bag",
            ContainerType::BagFirstAid => "First-aid bag",
            ContainerType::VehicleVpsp => "VPSP vehicle",
            ContainerType::OxygenCylinder => "Oxygen cylinder",
            ContainerType::ReserveCase => "Reserve case",
            ContainerType::Other => "Other",
        }
    }
}

/// A physical kit, vehicle or cylinder. `identifier` is the scanned QR/barcode.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Container {
    pub id: String,
    #[serde(rename = "structure")]
    pub structure_id: String,
    #[serde(rename = "location")]
    pub location_id: Option<String>,
    #[serde(rename = "type")]
    pub container_type: ContainerType,
    pub identifier: String,
    pub label: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateContainerRequest {
    pub structure: String,
    pub location: Option<String>,
    #[serde(rename = "type")]
    pub container_type: ContainerType,
    #[validate(length(min = 1, max = 64, message = "Identifier must be between 1 and 64 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub identifier: String,
    #[validate(length(max = 255, message = "Label cannot exceed 255 characters"))]
    pub label: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateContainerRequest {
    pub structure: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
    #[serde(rename = "type")]
    pub container_type: Option<ContainerType>,
    #[validate(length(min = 1, max = 64, message = "Identifier must be between 1 and 64 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub identifier: Option<String>,
    #[validate(length(max = 255, message = "Label cannot exceed 255 characters"))]
    pub label: Option<String>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_type_field_name() {
        let json = serde_json::json!({
            "structure": "s1",
            "type": "BAG_OXY",
            "identifier": "QR-0001"
        });
        let request: CreateContainerRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.container_type, ContainerType::BagOxy);
        assert!(request.location.is_none());
        assert!(request.validate().is_ok());

        let unknown = serde_json::json!({
            "structure": "s1",
            "type": "SUBMARINE",
            "identifier": "QR-0002"
        });
        assert!(serde_json::from_value::<CreateContainerRequest>(unknown).is_err());
    }

    #[test]
    fn test_blank_identifier_rejected() {
        let request = CreateContainerRequest {
            structure: "s1".into(),
            location: None,
            container_type: ContainerType::Other,
            identifier: "  ".into(),
            label: None,
            is_active: None,
        };
        assert!(request.validate().is_err());
    }
}
