// src/api/auth.rs
//! Who is calling. Login itself happens elsewhere; this module only reads
//! the outcome, either from a header set by an authenticating proxy or from
//! the tower-sessions session.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tower_sessions::Session;

use super::error::ApiError;
use crate::models::{User, UserId};
use crate::state::AppState;

pub const SESSION_USER_KEY: &str = "passvault.user_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        CurrentUser {
            id: user.id,
            username: user.username,
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);

        if let Some(header) = &app.config.auth.trusted_user_header {
            if let Some(value) = parts.headers.get(header.as_str()) {
                let username = value.to_str().map_err(|_| ApiError::Unauthenticated)?;
                return match app.store.get_user_by_username(username) {
                    Some(user) => Ok(user.into()),
                    None => {
                        log::warn!("Trusted header names unknown user `{}`", username);
                        Err(ApiError::Unauthenticated)
                    }
                };
            }
        }

        let session = Session::from_request_parts(parts, state).await.map_err(|(_, msg)| {
            log::error!("Session unavailable: {}", msg);
            ApiError::CorruptSession
        })?;

        let Some(user_id) = session.get::<UserId>(SESSION_USER_KEY).await? else {
            return Err(ApiError::Unauthenticated);
        };

        match app.store.get_user(user_id) {
            Some(user) => Ok(user.into()),
            None => {
                log::warn!("Session refers to unknown user {}; dropping it", user_id);
                session.remove::<UserId>(SESSION_USER_KEY).await?;
                Err(ApiError::Unauthenticated)
            }
        }
    }
}

/// Marks the session as belonging to `user`. The session id is rotated.
///
/// `passvault serve` exposes no login route; a login front that links this
/// crate mounts its own handler on [`crate::server::build_app`] and calls
/// this once it has checked the user's credentials.
pub async fn sign_in(session: &Session, user: &User) -> Result<(), ApiError> {
    session.cycle_id().await?;
    session.insert(SESSION_USER_KEY, user.id).await?;
    log::info!("User {} signed in", user.id);
    Ok(())
}

pub async fn sign_out(session: &Session) -> Result<(), ApiError> {
    session.flush().await?;
    Ok(())
}
