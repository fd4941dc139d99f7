// src/validator.rs - Validation rules that span fields or need the stored row
use std::collections::BTreeMap;
use regex::Regex;
use lazy_static::lazy_static;
use chrono::{NaiveDate, Utc};
use validator::ValidationError;
use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::models::*;

lazy_static! {
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:[-_][a-z0-9]+)*$").unwrap();
}

// ==================== VALIDATION RESULT ====================

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: FieldErrors,
    pub warnings: BTreeMap<String, Vec<String>>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        for (field, errors) in other.errors {
            self.errors.entry(field).or_default().extend(errors);
        }
        for (field, warnings) in other.warnings {
            self.warnings.entry(field).or_default().extend(warnings);
        }
    }

    /// Warnings are logged; errors become a 400 with field detail.
    pub fn into_result(self) -> ApiResult<()> {
        for (field, warnings) in &self.warnings {
            log::warn!("Validation warning on {}: {}", field, warnings.join(", "));
        }
        if self.is_valid() {
            Ok(())
        } else {
            Err(ApiError::ValidationError(self.errors))
        }
    }
}

// ==================== FIELD VALIDATORS ====================

pub fn validate_slug(value: &str) -> Result<(), ValidationError> {
    if SLUG_REGEX.is_match(value) {
        Ok(())
    } else {
        let mut error = ValidationError::new("invalid_slug");
        error.message = Some("Slug may only contain lowercase letters, digits, '-' and '_'".into());
        Err(error)
    }
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("This field may not be blank.".into());
        Err(error)
    } else {
        Ok(())
    }
}

pub struct FieldValidator;

impl FieldValidator {
    pub fn positive_quantity(value: f64) -> Result<(), String> {
        if !value.is_finite() {
            Err("Quantity must be a finite number".to_string())
        } else if value <= 0.0 {
            Err("Quantity must be greater than zero".to_string())
        } else {
            Ok(())
        }
    }

    pub fn expiry_date(value: Option<NaiveDate>, today: NaiveDate) -> ValidationResult {
        let mut result = ValidationResult::new();
        if let Some(expiry) = value {
            if expiry < today {
                result.add_warning("expires_at", format!("Batch already expired on {}", expiry));
            }
        }
        result
    }
}

// ==================== CUSTOM VALIDATION ====================

pub trait CustomValidate {
    fn custom_validate(&self) -> ValidationResult;
}

impl CustomValidate for CreateStockMovementRequest {
    fn custom_validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Err(e) = FieldValidator::positive_quantity(self.quantity) {
            result.add_error("quantity", e);
        }
        result.merge(BusinessValidator::movement_lots(
            self.movement_type,
            self.from_lot.as_deref(),
            self.to_lot.as_deref(),
        ));

        result
    }
}

impl CustomValidate for CreateBatchRequest {
    fn custom_validate(&self) -> ValidationResult {
        FieldValidator::expiry_date(self.expires_at, Utc::now().date_naive())
    }
}

// ==================== BUSINESS VALIDATORS ====================

pub struct BusinessValidator;

impl BusinessValidator {
    /// TRANSFER needs both lots, IN/RESTOCK a destination, OUT/CONSUME a source, ADJUST neither.
    pub fn movement_lots(
        movement_type: MovementType,
        from_lot: Option<&str>,
        to_lot: Option<&str>,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();
        let (needs_from, needs_to) = movement_type.required_lots();

        if needs_from && from_lot.is_none() {
            result.add_error("from_lot", format!("A {} movement requires from_lot.", movement_type));
        }
        if needs_to && to_lot.is_none() {
            result.add_error("to_lot", format!("A {} movement requires to_lot.", movement_type));
        }
        if movement_type == MovementType::Transfer && from_lot.is_some() && from_lot == to_lot {
            result.add_error("to_lot", "A transfer must move stock between two different lots.");
        }

        result
    }

    /// Applies a partial update to a stored movement and re-checks the merged row.
    pub fn movement_update(existing: &StockMovement, patch: &UpdateStockMovementRequest) -> ValidationResult {
        let mut result = ValidationResult::new();

        let movement_type = patch.movement_type.unwrap_or(existing.movement_type);
        let from_lot = merge_nullable(&patch.from_lot, &existing.from_lot_id);
        let to_lot = merge_nullable(&patch.to_lot, &existing.to_lot_id);

        if let Some(quantity) = patch.quantity {
            if let Err(e) = FieldValidator::positive_quantity(quantity) {
                result.add_error("quantity", e);
            }
        }
        result.merge(Self::movement_lots(movement_type, from_lot.as_deref(), to_lot.as_deref()));

        result
    }

    pub fn structure_parent(structure_id: &str, parent_id: Option<&str>) -> ValidationResult {
        let mut result = ValidationResult::new();
        if parent_id == Some(structure_id) {
            result.add_error("parent", "A structure cannot be its own parent.");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn movement(movement_type: MovementType, from: Option<&str>, to: Option<&str>) -> CreateStockMovementRequest {
        CreateStockMovementRequest {
            structure: "s".into(),
            movement_type,
            from_lot: from.map(String::from),
            to_lot: to.map(String::from),
            item: "i".into(),
            batch: None,
            quantity: 1.0,
            reason: None,
        }
    }

    #[test]
    fn test_slug_rules() {
        assert!(validate_slug("crf").is_ok());
        assert!(validate_slug("croix-rouge_75").is_ok());
        assert!(validate_slug("Croix Rouge").is_err());
        assert!(validate_slug("-crf").is_err());
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn test_not_blank() {
        assert!(validate_not_blank("UL 01").is_ok());
        assert!(validate_not_blank("   ").is_err());
    }

    #[test]
    fn test_transfer_requires_both_lots() {
        let result = movement(MovementType::Transfer, Some("a"), None).custom_validate();
        assert!(!result.is_valid());
        assert!(result.errors.contains_key("to_lot"));

        assert!(movement(MovementType::Transfer, Some("a"), Some("b")).custom_validate().is_valid());
        assert!(!movement(MovementType::Transfer, Some("a"), Some("a")).custom_validate().is_valid());
    }

    #[test]
    fn test_lot_rules_per_type() {
        assert!(movement(MovementType::In, None, Some("b")).custom_validate().is_valid());
        assert!(!movement(MovementType::In, Some("a"), None).custom_validate().is_valid());
        assert!(movement(MovementType::Out, Some("a"), None).custom_validate().is_valid());
        assert!(!movement(MovementType::Consume, None, Some("b")).custom_validate().is_valid());
        assert!(!movement(MovementType::Restock, None, None).custom_validate().is_valid());
        assert!(movement(MovementType::Adjust, None, None).custom_validate().is_valid());
    }

    #[test]
    fn test_quantity_must_be_positive() {
        let mut request = movement(MovementType::Adjust, None, None);
        request.quantity = 0.0;
        let result = request.custom_validate();
        assert!(result.errors.contains_key("quantity"));
    }

    #[test]
    fn test_update_checks_merged_row() {
        let now = Utc::now();
        let existing = StockMovement {
            id: "m".into(),
            structure_id: "s".into(),
            created_by: Some("u".into()),
            movement_type: MovementType::Out,
            from_lot_id: Some("a".into()),
            to_lot_id: None,
            item_id: "i".into(),
            batch_id: None,
            quantity: 2.0,
            reason: String::new(),
            created_at: now,
            updated_at: now,
        };
        let patch = UpdateStockMovementRequest {
            structure: None,
            movement_type: Some(MovementType::Transfer),
            from_lot: None,
            to_lot: None,
            item: None,
            batch: None,
            quantity: None,
            reason: None,
        };
        assert!(!BusinessValidator::movement_update(&existing, &patch).is_valid());

        let patch = UpdateStockMovementRequest { to_lot: Some(Some("b".into())), ..patch };
        assert!(BusinessValidator::movement_update(&existing, &patch).is_valid());

        // Clearing the source of an OUT leaves it without one.
        let patch = UpdateStockMovementRequest { movement_type: None, to_lot: None, from_lot: Some(None), ..patch };
        assert!(BusinessValidator::movement_update(&existing, &patch).errors.contains_key("from_lot"));
    }

    #[test]
    fn test_structure_parent_and_expiry_warning() {
        assert!(!BusinessValidator::structure_parent("s1", Some("s1")).is_valid());
        assert!(BusinessValidator::structure_parent("s1", Some("s0")).is_valid());

        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let result = FieldValidator::expiry_date(NaiveDate::from_ymd_opt(2025, 1, 1), today);
        assert!(result.is_valid());
        assert!(result.warnings.contains_key("expires_at"));
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationResult::new().into_result().is_ok());
        let mut result = ValidationResult::new();
        result.add_error("to_lot", "missing");
        assert!(matches!(result.into_result(), Err(ApiError::ValidationError(_))));
    }
}
