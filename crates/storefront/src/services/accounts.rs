//! Who is shopping: the signed-in account or an anonymous cart token.
//!
//! Credentials are checked elsewhere. This module reads and writes the
//! session keys in [`crate::models::session_keys`] and runs the guest cart
//! merge when a visitor signs in.

use thiserror::Error;
use tower_sessions::Session;
use tracing::instrument;

use techbazaar_core::{CartOwner, GuestToken};

use super::cart::{CartError, CartService, MergeSummary};
use crate::models::{CurrentUser, session_keys};

/// Errors from session bookkeeping.
#[derive(Debug, Error)]
pub enum AccountError {
    /// The session store failed.
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// The guest cart could not be merged; the visitor stays signed out.
    #[error("cart merge failed: {0}")]
    Merge(#[from] CartError),
}

/// The signed-in account, if any.
pub async fn current_user(session: &Session) -> Option<CurrentUser> {
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

/// The cart owner for this session, without creating anything.
///
/// Returns `None` for a visitor who has never added to a cart or wishlist.
pub async fn peek_owner(session: &Session) -> Option<CartOwner> {
    if let Some(user) = current_user(session).await {
        return Some(CartOwner::Account(user.id));
    }
    session
        .get::<GuestToken>(session_keys::GUEST_TOKEN)
        .await
        .ok()
        .flatten()
        .map(CartOwner::Guest)
}

/// The cart owner for this session, issuing a guest token on first use.
///
/// # Errors
///
/// Returns `AccountError::Session` if the token cannot be stored.
pub async fn cart_owner(session: &Session) -> Result<CartOwner, AccountError> {
    if let Some(owner) = peek_owner(session).await {
        return Ok(owner);
    }
    let token = GuestToken::generate();
    session.insert(session_keys::GUEST_TOKEN, &token).await?;
    tracing::debug!("Issued guest cart token");
    Ok(CartOwner::Guest(token))
}

/// Sign-in hook: fold the visitor's guest cart into the account, then mark
/// the session as signed in.
///
/// If the merge fails the session is left exactly as it was, so the guest
/// cart survives and the merge runs again on the next sign-in.
///
/// # Errors
///
/// - `AccountError::Merge` if the guest cart could not be merged
/// - `AccountError::Session` if the session store fails
#[instrument(skip(session, cart, user), fields(account_id = %user.id))]
pub async fn sign_in(
    session: &Session,
    cart: &CartService<'_>,
    user: CurrentUser,
) -> Result<MergeSummary, AccountError> {
    let guest = session
        .get::<GuestToken>(session_keys::GUEST_TOKEN)
        .await?;

    let summary = match &guest {
        Some(token) => cart.merge_guest_into_account(token, user.id).await?,
        None => MergeSummary::default(),
    };

    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, &user).await?;
    if guest.is_some() {
        session.remove::<GuestToken>(session_keys::GUEST_TOKEN).await?;
    }

    crate::error::set_sentry_user(&user.id, Some(user.email.as_str()));
    tracing::info!(
        merged = summary.merged,
        reassigned = summary.reassigned,
        "Signed in"
    );
    Ok(summary)
}

/// Forget the session entirely.
///
/// # Errors
///
/// Returns `AccountError::Session` if the session store fails.
pub async fn sign_out(session: &Session) -> Result<(), AccountError> {
    session.flush().await?;
    crate::error::clear_sentry_user();
    Ok(())
}
