//! Authentication extractors.
//!
//! Sign-in itself happens outside the storefront; these extractors read the
//! account the sign-in hook stored in the session.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tower_sessions::Session;

use crate::models::CurrentUser;
use crate::services::accounts;

/// Extractor that requires a signed-in account.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Error returned when authentication is required but nobody is signed in.
pub enum AuthRejection {
    /// No session layer on the route.
    MissingSession,
    /// Session has no signed-in account.
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::MissingSession => {
                tracing::error!("Session layer missing on authenticated route");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "sign in required" })),
            )
                .into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::MissingSession)?;

        let user = accounts::current_user(session)
            .await
            .ok_or(AuthRejection::Unauthorized)?;

        Ok(Self(user))
    }
}
