use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Field name -> messages, serialized as-is to clients.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    ValidationError(FieldErrors),
    ServiceUnavailable(String),
    InternalServerError(String),
    DatabaseError(sqlx::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorResponse<'a> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a FieldErrors>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::ValidationError(errors) => {
                let joined = errors
                    .iter()
                    .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "Validation Error: {}", joined)
            }
            ApiError::ServiceUnavailable(msg) => write!(f, "Service Unavailable: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::DatabaseError(err) => write!(f, "Database Error: {}", err),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let errors = match self {
            ApiError::ValidationError(errors) => Some(errors),
            _ => None,
        };
        // Storage details stay in the server log.
        let message = match self {
            ApiError::DatabaseError(err) => {
                log::error!("Database error: {}", err);
                "Internal Server Error: database failure".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorResponse {
            success: false,
            message,
            errors,
        };

        match self {
            ApiError::BadRequest(_) => HttpResponse::BadRequest().json(body),
            ApiError::NotFound(_) => HttpResponse::NotFound().json(body),
            ApiError::Unauthorized(_) => HttpResponse::Unauthorized().json(body),
            ApiError::Forbidden(_) => HttpResponse::Forbidden().json(body),
            ApiError::ValidationError(_) => HttpResponse::BadRequest().json(body),
            ApiError::ServiceUnavailable(_) => HttpResponse::ServiceUnavailable().json(body),
            ApiError::DatabaseError(_) => HttpResponse::InternalServerError().json(body),
            ApiError::InternalServerError(_) => HttpResponse::InternalServerError().json(body),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        let constraint = match &err {
            sqlx::Error::Database(db_err) if is_foreign_key_failure(db_err.code().as_deref(), db_err.message()) => {
                Some((ErrorKind::ForeignKeyViolation, db_err.message().to_string()))
            }
            sqlx::Error::Database(db_err) => Some((db_err.kind(), db_err.message().to_string())),
            _ => None,
        };

        match constraint {
            Some((ErrorKind::UniqueViolation, message)) => unique_violation(&message),
            Some((ErrorKind::CheckViolation, message)) => {
                let name = message
                    .rsplit(": ")
                    .next()
                    .unwrap_or("constraint")
                    .to_string();
                ApiError::field("non_field_errors", format!("Constraint violated: {}", name))
            }
            Some((ErrorKind::ForeignKeyViolation, _)) => ApiError::BadRequest(
                "Referenced record does not exist, or the record is still referenced by other records"
                    .to_string(),
            ),
            Some((ErrorKind::NotNullViolation, message)) => {
                let column = message.rsplit('.').next().unwrap_or("field").to_string();
                ApiError::field(column, "This field may not be null.")
            }
            _ => ApiError::DatabaseError(err),
        }
    }
}

/// `ON DELETE RESTRICT` surfaces as SQLITE_CONSTRAINT_TRIGGER (1811), which
/// sqlx does not classify as a foreign key error.
fn is_foreign_key_failure(code: Option<&str>, message: &str) -> bool {
    matches!(code, Some("787") | Some("1811")) || message.contains("FOREIGN KEY constraint failed")
}

/// SQLite reports "UNIQUE constraint failed: table.col_a, table.col_b".
fn unique_violation(message: &str) -> ApiError {
    let columns = message
        .split_once(": ")
        .map(|(_, cols)| {
            cols.split(", ")
                .map(|c| c.rsplit('.').next().unwrap_or(c).to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let text = if columns.is_empty() {
        "A record with these values already exists.".to_string()
    } else {
        format!("The fields {} must make a unique set.", columns.join(", "))
    };
    ApiError::field("non_field_errors", text)
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errors) in err.field_errors() {
            let key = match field.to_string().as_str() {
                "__all__" => "non_field_errors".to_string(),
                other => other.to_string(),
            };
            let messages = fields.entry(key).or_default();
            for error in errors.iter() {
                messages.push(
                    error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", error.code)),
                );
            }
        }
        ApiError::ValidationError(fields)
    }
}

impl ApiError {
    pub fn bad_request(msg: &str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }

    pub fn not_found(entity: &str) -> Self {
        ApiError::NotFound(format!("{} not found", entity))
    }

    pub fn forbidden(msg: &str) -> Self {
        ApiError::Forbidden(msg.to_string())
    }

    /// Single field-level validation failure.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.into(), vec![message.into()]);
        ApiError::ValidationError(fields)
    }
}
