use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

/// Header carrying the acting principal, set by the upstream auth layer.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// The principal a write is attributed to in the inventory log.
///
/// Add this as a handler parameter to require the `X-Actor-Id` header.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AppError::ActorMissing)?;

        if id.chars().count() > 128 {
            return Err(AppError::Validation(
                "X-Actor-Id must be at most 128 characters".into(),
            ));
        }

        Ok(Actor { id: id.to_string() })
    }
}
