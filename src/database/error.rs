use std::fmt::{self, Display};

use potion::Error;
use warp::reject::Rejection;

/// Store failure detail carried into `ServiceError::Internal`.
pub struct QueryError {
    info: String,
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        let info = match &value {
            sqlx::Error::Database(e) => format!("database: {}", e.message()),
            sqlx::Error::ColumnDecode { index, source } => {
                format!("decoding column {index}: {source}")
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                format!("connection pool: {value}")
            }
            other => other.to_string(),
        };

        Self { info }
    }
}

/// Redis failure detail carried into `ServiceError::Internal`.
pub struct CacheError {
    info: String,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("cache: {value}"),
        }
    }
}

/// A form value of the wrong JSON type.
#[derive(Debug)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info)
    }
}

/// Every failure a recipe, relation or shopping list operation can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// No authenticated actor where one is required
    Unauthorized,
    /// Authenticated, but neither the owner nor an admin
    Forbidden,
    NotFound(String),
    /// The requested transition is invalid in the current state
    Conflict(String),
    InvalidValue { field: String, value: String },
    MalformedInput { field: String, reason: String },
    ReferenceNotFound { field: String, id: i64 },
    EmptyCart,
    Internal(String),
}

impl ServiceError {
    pub fn invalid(field: &str, value: impl ToString) -> Self {
        Self::InvalidValue {
            field: field.to_owned(),
            value: value.to_string(),
        }
    }

    pub fn malformed(field: &str, reason: &str) -> Self {
        Self::MalformedInput {
            field: field.to_owned(),
            reason: reason.to_owned(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(what.to_owned())
    }

    pub fn conflict(reason: &str) -> Self {
        Self::Conflict(reason.to_owned())
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Unauthorized => write!(f, "Authentication required"),
            ServiceError::Forbidden => {
                write!(f, "You don't have permission to perform this action")
            }
            ServiceError::NotFound(what) => write!(f, "{what} not found"),
            ServiceError::Conflict(reason) => write!(f, "{reason}"),
            ServiceError::InvalidValue { field, value } => {
                write!(f, "Invalid value for `{field}`: {value}")
            }
            ServiceError::MalformedInput { field, reason } => {
                write!(f, "Malformed `{field}`: {reason}")
            }
            ServiceError::ReferenceNotFound { field, id } => {
                write!(f, "`{field}` references {id}, which doesn't exist")
            }
            ServiceError::EmptyCart => write!(f, "Shopping cart is empty"),
            ServiceError::Internal(info) => write!(f, "Internal error: {info}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<sqlx::Error> for ServiceError {
    fn from(value: sqlx::Error) -> Self {
        match &value {
            sqlx::Error::RowNotFound => return Self::not_found("Row"),
            sqlx::Error::Database(e) if e.is_unique_violation() => {
                return Self::Conflict(format!(
                    "Already exists ({})",
                    e.constraint().unwrap_or("unique")
                ));
            }
            sqlx::Error::Database(e) if e.is_check_violation() => {
                return Self::invalid(e.constraint().unwrap_or("check"), e.message());
            }
            sqlx::Error::Database(e) if e.is_foreign_key_violation() => {
                return Self::NotFound(format!(
                    "Referenced row ({})",
                    e.constraint().unwrap_or("foreign key")
                ));
            }
            _ => {}
        }

        Self::Internal(QueryError::from(value).info)
    }
}

impl From<CacheError> for ServiceError {
    fn from(value: CacheError) -> Self {
        Self::Internal(value.info)
    }
}

impl Into<Error> for ServiceError {
    fn into(self) -> Error {
        let code = match self {
            ServiceError::Unauthorized => 401,
            ServiceError::Forbidden => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_)
            | ServiceError::InvalidValue { .. }
            | ServiceError::MalformedInput { .. }
            | ServiceError::ReferenceNotFound { .. }
            | ServiceError::EmptyCart => 400,
            ServiceError::Internal(_) => 500,
        };

        Error {
            code,
            info: Some(self.to_string()),
            redirect: None,
        }
    }
}

impl Into<Rejection> for ServiceError {
    fn into(self) -> Rejection {
        let error: Error = self.into();
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_of(error: ServiceError) -> Error {
        error.into()
    }

    #[test]
    fn status_codes_follow_the_error_kind() {
        assert_eq!(code_of(ServiceError::Unauthorized).code, 401);
        assert_eq!(code_of(ServiceError::Forbidden).code, 403);
        assert_eq!(code_of(ServiceError::not_found("Recipe")).code, 404);
        assert_eq!(code_of(ServiceError::conflict("Already in favorites")).code, 400);
        assert_eq!(code_of(ServiceError::EmptyCart).code, 400);
        assert_eq!(code_of(ServiceError::invalid("amount", 0)).code, 400);
        assert_eq!(code_of(ServiceError::Internal("boom".into())).code, 500);
    }

    #[test]
    fn field_errors_name_the_field_and_value() {
        let message = ServiceError::invalid("ingredients.amount", "0").to_string();
        assert!(message.contains("ingredients.amount"));
        assert!(message.contains('0'));

        let info = code_of(ServiceError::malformed("tags", "expected a list")).info;
        assert_eq!(info.as_deref(), Some("Malformed `tags`: expected a list"));
    }

    #[test]
    fn missing_rows_become_not_found() {
        assert_eq!(
            ServiceError::from(sqlx::Error::RowNotFound),
            ServiceError::not_found("Row")
        );
        assert!(matches!(
            ServiceError::from(sqlx::Error::PoolClosed),
            ServiceError::Internal(info) if info.starts_with("connection pool: ")
        ));
    }

    #[test]
    fn cache_failures_are_internal() {
        let redis = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));
        let error = ServiceError::from(CacheError::from(redis));

        assert!(matches!(&error, ServiceError::Internal(info) if info.contains("connection refused")));
        assert_eq!(code_of(error).code, 500);
    }
}
