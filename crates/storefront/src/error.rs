//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::accounts::AccountError;
use crate::services::cart::CartError;
use crate::services::orders::OrderError;
use crate::services::payment::{GatewayError, StartPaymentError};
use crate::services::wishlist::WishlistError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Wishlist operation failed.
    #[error("Wishlist error: {0}")]
    Wishlist(#[from] WishlistError),

    /// Order operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Payment gateway call failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Session bookkeeping failed.
    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<StartPaymentError> for AppError {
    fn from(err: StartPaymentError) -> Self {
        match err {
            StartPaymentError::Order(e) => Self::Order(e),
            StartPaymentError::Gateway(e) => Self::Gateway(e),
        }
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Account(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Cart(err) => cart_status(err),
            Self::Wishlist(err) => match err {
                WishlistError::Variation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                WishlistError::ProductNotFound(_) | WishlistError::ItemNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                WishlistError::CartLineFull => StatusCode::CONFLICT,
                WishlistError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Order(err) => match err {
                OrderError::LoginRequired => StatusCode::UNAUTHORIZED,
                OrderError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderError::EmptyCart
                | OrderError::OutOfStock { .. }
                | OrderError::NotPayable { .. }
                | OrderError::DuplicatePayment(_)
                | OrderError::FinalizationConflict(_) => StatusCode::CONFLICT,
                OrderError::Cart(err) => cart_status(err),
                OrderError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Gateway(err) => match err {
                GatewayError::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
                GatewayError::Rejected(_) => StatusCode::BAD_GATEWAY,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show the client.
    fn public_message(&self) -> String {
        match self {
            Self::Gateway(_) => {
                "The payment gateway is unavailable right now. Please try again.".to_string()
            }
            _ if self.status().is_server_error() => "Internal server error".to_string(),
            Self::Cart(err) => err.to_string(),
            Self::Wishlist(err) => err.to_string(),
            Self::Order(err) => err.to_string(),
            _ => self.to_string(),
        }
    }
}

const fn cart_status(err: &CartError) -> StatusCode {
    match err {
        CartError::Variation(_) | CartError::InvalidQuantity(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CartError::ProductNotFound(_) | CartError::ItemNotFound(_) => StatusCode::NOT_FOUND,
        CartError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let body = Json(json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("navigation", "Viewed product page", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use techbazaar_core::{OrderNumber, OrderStatus, ProductId, VariationError};

    use super::*;
    use crate::services::orders::ConflictReason;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::NotFound)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_domain_error_status_codes() {
        assert_eq!(
            get_status(CartError::InvalidQuantity("0".to_string()).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(
                CartError::Variation(VariationError::SelectionIncomplete {
                    missing: vec!["color".to_string()]
                })
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(
                OrderError::FinalizationConflict(ConflictReason::ProductMissing(ProductId::new(1)))
                    .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(
                OrderError::NotPayable {
                    number: OrderNumber::parse("202610161").unwrap(),
                    status: OrderStatus::Paid,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(get_status(OrderError::LoginRequired.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(
            get_status(GatewayError::Unreachable("timeout".to_string()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(GatewayError::Rejected("FAILED".to_string()).into()),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption("bad row 17".to_string()));
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::Order(OrderError::Repository(RepositoryError::NotFound));
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::Order(OrderError::EmptyCart);
        assert_eq!(err.public_message(), "cart is empty");
    }
}
