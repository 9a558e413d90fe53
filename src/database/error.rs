use log::error;
use serde_json::{json, Value};
use sqlx::error::ErrorKind;
use thiserror::Error;
use warp::http::StatusCode;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            ApiError::Validation { field, message } => json!({ field.as_str(): [message] }),
            ApiError::Conflict(message) => json!({ "errors": message }),
            ApiError::NotFound(message)
            | ApiError::Unauthorized(message)
            | ApiError::PermissionDenied(message) => json!({ "detail": message }),
            ApiError::Internal(_) => json!({ "detail": "Internal server error" }),
        }
    }
}

impl warp::reject::Reject for ApiError {}

impl From<sqlx::Error> for ApiError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self::NotFound(String::from("Not found")),
            sqlx::Error::Database(e) => constraint_error(e.kind(), e.constraint())
                .unwrap_or_else(|| Self::Internal(format!("{e}"))),
            sqlx::Error::PoolTimedOut => Self::Internal(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::Internal(String::from("Pool closed")),
            e => {
                error!("Unexpected database error: {e}");
                Self::Internal(format!("{e}"))
            }
        }
    }
}

/// Maps a storage constraint violation to the error the application-level
/// check would have produced for the same input.
pub fn constraint_error(kind: ErrorKind, constraint: Option<&str>) -> Option<ApiError> {
    match kind {
        ErrorKind::UniqueViolation => Some(match constraint {
            Some("unique_favorite") => ApiError::Conflict(String::from("Recipe is already in favorites")),
            Some("unique_shopping_cart") => {
                ApiError::Conflict(String::from("Recipe is already in the shopping cart"))
            }
            Some("unique_subscription") => {
                ApiError::Conflict(String::from("Already subscribed to this author"))
            }
            Some("unique_recipe_name") => {
                ApiError::validation("name", "A recipe with this name already exists")
            }
            Some("unique_recipe_ingredient") => {
                ApiError::validation("ingredients", "Ingredients must not repeat")
            }
            Some("unique_username") => {
                ApiError::validation("username", "A user with this username already exists")
            }
            Some("unique_email") => {
                ApiError::validation("email", "A user with this email already exists")
            }
            Some("unique_tag_name") => ApiError::validation("name", "A tag with this name already exists"),
            Some("unique_tag_color") => {
                ApiError::validation("color", "A tag with this color already exists")
            }
            Some("unique_tag_slug") => ApiError::validation("slug", "A tag with this slug already exists"),
            _ => ApiError::Conflict(String::from("Entry already exists")),
        }),
        ErrorKind::CheckViolation => Some(match constraint {
            Some("no_self_subscription") => {
                ApiError::validation("author", "You cannot subscribe to yourself")
            }
            Some(constraint) => ApiError::validation("non_field_errors", format!("Constraint {constraint} failed")),
            None => ApiError::validation("non_field_errors", "Constraint failed"),
        }),
        ErrorKind::ForeignKeyViolation => Some(ApiError::validation(
            "non_field_errors",
            "Referenced object does not exist",
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("unique_favorite", "Recipe is already in favorites")]
    #[case("unique_shopping_cart", "Recipe is already in the shopping cart")]
    #[case("unique_subscription", "Already subscribed to this author")]
    fn duplicate_pairs_become_conflicts(#[case] constraint: &str, #[case] message: &str) {
        let error = constraint_error(ErrorKind::UniqueViolation, Some(constraint));
        assert_eq!(error, Some(ApiError::Conflict(message.to_string())));
    }

    #[test]
    fn duplicate_recipe_name_is_a_field_error() {
        let error = constraint_error(ErrorKind::UniqueViolation, Some("unique_recipe_name")).unwrap();
        assert!(matches!(error, ApiError::Validation { ref field, .. } if field == "name"));
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn self_subscription_check_is_a_validation_error() {
        let error = constraint_error(ErrorKind::CheckViolation, Some("no_self_subscription")).unwrap();
        assert!(matches!(error, ApiError::Validation { ref field, .. } if field == "author"));
    }

    #[test]
    fn other_database_errors_are_not_translated() {
        assert_eq!(constraint_error(ErrorKind::Other, None), None);
    }

    #[rstest]
    #[case(ApiError::validation("name", "x"), StatusCode::BAD_REQUEST)]
    #[case(ApiError::Conflict(String::new()), StatusCode::BAD_REQUEST)]
    #[case(ApiError::NotFound(String::new()), StatusCode::NOT_FOUND)]
    #[case(ApiError::Unauthorized(String::new()), StatusCode::UNAUTHORIZED)]
    #[case(ApiError::PermissionDenied(String::new()), StatusCode::FORBIDDEN)]
    #[case(ApiError::Internal(String::new()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn status_codes(#[case] error: ApiError, #[case] status: StatusCode) {
        assert_eq!(error.status(), status);
    }

    #[test]
    fn validation_body_is_keyed_by_field() {
        let body = ApiError::validation("tags", "At least one tag is required").body();
        assert_eq!(body, json!({ "tags": ["At least one tag is required"] }));
    }

    #[test]
    fn converts_into_a_rejection_carrying_itself() {
        let rejection: warp::Rejection = ApiError::NotFound(String::from("gone")).into();

        assert_eq!(
            rejection.find::<ApiError>(),
            Some(&ApiError::NotFound(String::from("gone")))
        );
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let body = ApiError::Internal(String::from("connection refused")).body();
        assert_eq!(body, json!({ "detail": "Internal server error" }));
    }
}
