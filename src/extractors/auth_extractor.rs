use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::{async_trait, http::request::Parts};
use hyper::header::AUTHORIZATION;
use serde::Deserialize;
use sqlx::FromRow;
use tracing::warn;

use crate::structs::status::UserStatus;
use crate::utils::app_error::AppError;
use crate::AppState;

#[derive(Deserialize, FromRow)]
pub struct InnerAuthUser {
    pub id: i64,
    pub username: String,
    pub status: i64,
}

/// Resolves the acting user from a `Authorization: Bearer <token>` header.
/// Requests without a token get `AuthUser(None)` so public endpoints can
/// still look at who is asking.
pub struct AuthUser(pub Option<Arc<InnerAuthUser>>);

impl AuthUser {
    pub fn required(self) -> Result<Arc<InnerAuthUser>, AppError> {
        self.0.ok_or_else(AppError::not_connected)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        let Some(token) = token else {
            return Ok(AuthUser(None));
        };

        let user = sqlx::query_as::<_, InnerAuthUser>(
            "SELECT id, username, status FROM users WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&app_state.pool)
        .await?;

        match user {
            Some(user) if user.status == UserStatus::Disabled.code() => {
                warn!("Disabled user {} tried to authenticate", user.id);
                Err(AppError::Forbidden("this account is disabled"))
            }
            Some(user) => Ok(AuthUser(Some(Arc::new(user)))),
            None => Ok(AuthUser(None)),
        }
    }
}
