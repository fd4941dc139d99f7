// src/models/catalog.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, NaiveDate, Utc};
use strum::{AsRefStr, Display, EnumString};

use super::nullable;

use crate::validator::validate_not_blank;

// ==================== ITEM ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Item {
    pub id: String,
    #[serde(rename = "organization")]
    pub organization_id: String,
    pub name: String,
    pub sku: String,
    pub unit: String,
    pub category: String,
    pub is_consumable: bool,
    pub requires_expiry: bool,
    pub requires_lot_number: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateItemRequest {
    pub organization: String,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(max = 64, message = "SKU cannot exceed 64 characters"))]
    pub sku: Option<String>,
    #[validate(length(max = 32, message = "Unit cannot exceed 32 characters"))]
    pub unit: Option<String>,
    #[validate(length(max = 128, message = "Category cannot exceed 128 characters"))]
    pub category: Option<String>,
    pub is_consumable: Option<bool>,
    pub requires_expiry: Option<bool>,
    pub requires_lot_number: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 64, message = "SKU cannot exceed 64 characters"))]
    pub sku: Option<String>,
    #[validate(length(max = 32, message = "Unit cannot exceed 32 characters"))]
    pub unit: Option<String>,
    #[validate(length(max = 128, message = "Category cannot exceed 128 characters"))]
    pub category: Option<String>,
    pub is_consumable: Option<bool>,
    pub requires_expiry: Option<bool>,
    pub requires_lot_number: Option<bool>,
    pub is_active: Option<bool>,
}

// ==================== LOT TEMPLATE ====================

/// Official kit recipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString, AsRefStr)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LotCode {
    LotA,
    LotB,
    LotC,
    Vpsp,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LotTemplate {
    pub id: String,
    #[serde(rename = "organization")]
    pub organization_id: String,
    pub code: LotCode,
    pub name: String,
    pub version: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateLotTemplateRequest {
    pub organization: String,
    pub code: LotCode,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(max = 32, message = "Version cannot exceed 32 characters"))]
    pub version: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateLotTemplateRequest {
    pub code: Option<LotCode>,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 32, message = "Version cannot exceed 32 characters"))]
    pub version: Option<String>,
    pub is_active: Option<bool>,
}

// ==================== LOT TEMPLATE ITEM ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString, AsRefStr)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemGroup {
    AdminDocs,
    Comms,
    Protection,
    Vitals,
    Wounds,
    Trauma,
    Resusc,
    Divers,
    SpecificKits,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LotTemplateItem {
    pub id: String,
    #[serde(rename = "template")]
    pub template_id: String,
    pub group: ItemGroup,
    #[serde(rename = "item")]
    pub item_id: String,
    pub expected_qty: f64,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateLotTemplateItemRequest {
    pub template: String,
    pub group: ItemGroup,
    pub item: String,
    #[validate(range(min = 0.0, message = "Expected quantity cannot be negative"))]
    pub expected_qty: f64,
    #[validate(length(max = 255, message = "Notes cannot exceed 255 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateLotTemplateItemRequest {
    pub group: Option<ItemGroup>,
    pub item: Option<String>,
    #[validate(range(min = 0.0, message = "Expected quantity cannot be negative"))]
    pub expected_qty: Option<f64>,
    #[validate(length(max = 255, message = "Notes cannot exceed 255 characters"))]
    pub notes: Option<String>,
}

// ==================== BATCH ====================

/// Manufacturing lot of an item, optionally with an expiry date.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Batch {
    pub id: String,
    #[serde(rename = "item")]
    pub item_id: String,
    pub lot_number: String,
    pub expires_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn is_expired_on(&self, day: NaiveDate) -> bool {
        self.expires_at.map(|expiry| expiry < day).unwrap_or(false)
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateBatchRequest {
    pub item: String,
    #[validate(length(max = 64, message = "Lot number cannot exceed 64 characters"))]
    pub lot_number: Option<String>,
    pub expires_at: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateBatchRequest {
    #[validate(length(max = 64, message = "Lot number cannot exceed 64 characters"))]
    pub lot_number: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub expires_at: Option<Option<NaiveDate>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_values() {
        assert_eq!(LotCode::LotC.as_ref(), "LOT_C");
        assert_eq!(serde_json::to_string(&ItemGroup::SpecificKits).unwrap(), "\"SPECIFIC_KITS\"");
        assert!(serde_json::from_str::<LotCode>("\"LOT_Z\"").is_err());
    }

    #[test]
    fn test_template_item_rejects_negative_quantity() {
        let request = CreateLotTemplateItemRequest {
            template: "t".into(),
            group: ItemGroup::Wounds,
            item: "i".into(),
            expected_qty: -1.0,
            notes: None,
        };
        assert!(request.validate().is_err());

        let request = CreateLotTemplateItemRequest { expected_qty: 0.0, ..request };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_batch_expiry() {
        let now = Utc::now();
        let batch = Batch {
            id: "b".into(),
            item_id: "i".into(),
            lot_number: "L42".into(),
            expires_at: NaiveDate::from_ymd_opt(2025, 6, 30),
            created_at: now,
            updated_at: now,
        };
        assert!(batch.is_expired_on(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
        assert!(!batch.is_expired_on(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()));

        let undated = Batch { expires_at: None, ..batch };
        assert!(!undated.is_expired_on(NaiveDate::from_ymd_opt(2099, 1, 1).unwrap()));
    }
}
