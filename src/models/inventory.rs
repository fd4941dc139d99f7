// src/models/inventory.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};

// ==================== INVENTORY SESSION ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct InventorySession {
    pub id: String,
    #[serde(rename = "structure")]
    pub structure_id: String,
    #[serde(rename = "container")]
    pub container_id: String,
    pub validated_at: Option<DateTime<Utc>>,
    pub validated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventorySession {
    pub fn is_validated(&self) -> bool {
        self.validated_at.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateInventorySessionRequest {
    pub structure: String,
    pub container: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateInventorySessionRequest {
    pub structure: Option<String>,
    pub container: Option<String>,
}

// ==================== INVENTORY LINE ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct InventoryLine {
    pub id: String,
    #[serde(rename = "session")]
    pub session_id: String,
    #[serde(rename = "item")]
    pub item_id: String,
    pub expected_qty: f64,
    pub counted_qty: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateInventoryLineRequest {
    pub session: String,
    pub item: String,
    #[validate(range(min = 0.0, message = "Expected quantity cannot be negative"))]
    pub expected_qty: Option<f64>,
    #[validate(range(min = 0.0, message = "Counted quantity cannot be negative"))]
    pub counted_qty: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateInventoryLineRequest {
    pub session: Option<String>,
    pub item: Option<String>,
    #[validate(range(min = 0.0, message = "Expected quantity cannot be negative"))]
    pub expected_qty: Option<f64>,
    #[validate(range(min = 0.0, message = "Counted quantity cannot be negative"))]
    pub counted_qty: Option<f64>,
}

// ==================== RECONCILIATION ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineStatus {
    Match,
    Shortage,
    Surplus,
}

#[derive(Debug, Serialize, Clone)]
pub struct ReconciliationLine {
    pub line: String,
    pub item: String,
    pub expected_qty: f64,
    pub counted_qty: f64,
    pub difference: f64,
    pub status: LineStatus,
}

impl From<&InventoryLine> for ReconciliationLine {
    fn from(line: &InventoryLine) -> Self {
        let difference = line.counted_qty - line.expected_qty;
        let status = if difference.abs() < f64::EPSILON {
            LineStatus::Match
        } else if difference < 0.0 {
            LineStatus::Shortage
        } else {
            LineStatus::Surplus
        };
        ReconciliationLine {
            line: line.id.clone(),
            item: line.item_id.clone(),
            expected_qty: line.expected_qty,
            counted_qty: line.counted_qty,
            difference,
            status,
        }
    }
}

#[derive(Debug, Serialize, Default, Clone, PartialEq)]
pub struct ReconciliationTotals {
    pub lines: usize,
    pub matching: usize,
    pub shortages: usize,
    pub surpluses: usize,
}

#[derive(Debug, Serialize, Clone)]
pub struct Reconciliation {
    pub session: String,
    pub validated: bool,
    pub lines: Vec<ReconciliationLine>,
    pub totals: ReconciliationTotals,
}

impl Reconciliation {
    pub fn build(session: &InventorySession, lines: &[InventoryLine]) -> Self {
        let lines: Vec<ReconciliationLine> = lines.iter().map(ReconciliationLine::from).collect();
        let mut totals = ReconciliationTotals {
            lines: lines.len(),
            ..Default::default()
        };
        for line in &lines {
            match line.status {
                LineStatus::Match => totals.matching += 1,
                LineStatus::Shortage => totals.shortages += 1,
                LineStatus::Surplus => totals.surpluses += 1,
            }
        }
        Reconciliation {
            session: session.id.clone(),
            validated: session.is_validated(),
            lines,
            totals,
        }
    }
}
