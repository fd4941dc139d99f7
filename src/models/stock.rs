// src/models/stock.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumString};

use super::nullable;

// ==================== LOT INSTANCE ====================

pub const DEFAULT_LOT_STATUS: &str = "READY";

/// A template realized inside one container.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LotInstance {
    pub id: String,
    #[serde(rename = "template")]
    pub template_id: String,
    #[serde(rename = "container")]
    pub container_id: String,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_check_due_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LotInstance {
    pub fn is_check_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.next_check_due_at, Some(due) if due < now)
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateLotInstanceRequest {
    pub template: String,
    pub container: String,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_check_due_at: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 32, message = "Status must be between 1 and 32 characters"))]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateLotInstanceRequest {
    pub template: Option<String>,
    pub container: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub last_checked_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub next_check_due_at: Option<Option<DateTime<Utc>>>,
    #[validate(length(min = 1, max = 32, message = "Status must be between 1 and 32 characters"))]
    pub status: Option<String>,
}

// ==================== STOCK LINE ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct StockLine {
    pub id: String,
    #[serde(rename = "lot_instance")]
    pub lot_instance_id: String,
    #[serde(rename = "item")]
    pub item_id: String,
    #[serde(rename = "batch")]
    pub batch_id: Option<String>,
    pub quantity: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateStockLineRequest {
    pub lot_instance: String,
    pub item: String,
    pub batch: Option<String>,
    #[validate(range(min = 0.0, message = "Quantity cannot be negative"))]
    pub quantity: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateStockLineRequest {
    pub lot_instance: Option<String>,
    pub item: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub batch: Option<Option<String>>,
    #[validate(range(min = 0.0, message = "Quantity cannot be negative"))]
    pub quantity: Option<f64>,
}

// ==================== STOCK MOVEMENT ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString, AsRefStr)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    Transfer,
    Adjust,
    Consume,
    Restock,
}

impl MovementType {
    /// Which lot references the movement type demands: `(from_lot, to_lot)`.
    pub fn required_lots(&self) -> (bool, bool) {
        match self {
            MovementType::Transfer => (true, true),
            MovementType::In | MovementType::Restock => (false, true),
            MovementType::Out | MovementType::Consume => (true, false),
            MovementType::Adjust => (false, false),
        }
    }
}

/// Audited stock change. `created_by` is always the authenticated requester.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct StockMovement {
    pub id: String,
    #[serde(rename = "structure")]
    pub structure_id: String,
    pub created_by: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    #[serde(rename = "from_lot")]
    pub from_lot_id: Option<String>,
    #[serde(rename = "to_lot")]
    pub to_lot_id: Option<String>,
    #[serde(rename = "item")]
    pub item_id: String,
    #[serde(rename = "batch")]
    pub batch_id: Option<String>,
    pub quantity: f64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateStockMovementRequest {
    pub structure: String,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub from_lot: Option<String>,
    pub to_lot: Option<String>,
    pub item: String,
    pub batch: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "Quantity must be greater than zero"))]
    pub quantity: f64,
    #[validate(length(max = 255, message = "Reason cannot exceed 255 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateStockMovementRequest {
    pub structure: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: Option<MovementType>,
    #[serde(default, deserialize_with = "nullable")]
    pub from_lot: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub to_lot: Option<Option<String>>,
    pub item: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub batch: Option<Option<String>>,
    #[validate(range(exclusive_min = 0.0, message = "Quantity must be greater than zero"))]
    pub quantity: Option<f64>,
    #[validate(length(max = 255, message = "Reason cannot exceed 255 characters"))]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_required_lots_per_type() {
        assert_eq!(MovementType::Transfer.required_lots(), (true, true));
        assert_eq!(MovementType::In.required_lots(), (false, true));
        assert_eq!(MovementType::Restock.required_lots(), (false, true));
        assert_eq!(MovementType::Out.required_lots(), (true, false));
        assert_eq!(MovementType::Consume.required_lots(), (true, false));
        assert_eq!(MovementType::Adjust.required_lots(), (false, false));
    }

    #[test]
    fn test_movement_quantity_must_be_positive() {
        for quantity in [0.0, -3.0] {
            let request = CreateStockMovementRequest {
                structure: "s".into(),
                movement_type: MovementType::Adjust,
                from_lot: None,
                to_lot: None,
                item: "i".into(),
                batch: None,
                quantity,
                reason: None,
            };
            assert!(request.validate().is_err(), "quantity {} accepted", quantity);
        }
    }

    #[test]
    fn test_stock_line_quantity_non_negative() {
        let request = CreateStockLineRequest {
            lot_instance: "l".into(),
            item: "i".into(),
            batch: None,
            quantity: Some(-0.5),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_overdue_check() {
        let now = Utc::now();
        let lot = LotInstance {
            id: "l".into(),
            template_id: "t".into(),
            container_id: "c".into(),
            last_checked_at: None,
            next_check_due_at: Some(now - Duration::days(1)),
            status: DEFAULT_LOT_STATUS.into(),
            created_at: now,
            updated_at: now,
        };
        assert!(lot.is_check_overdue(now));
        let unscheduled = LotInstance { next_check_due_at: None, ..lot };
        assert!(!unscheduled.is_check_overdue(now));
    }
}
