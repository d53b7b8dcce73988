use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::warn;

use efc_types::api::TokenPurpose;
use efc_types::permissions::Actor;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, with_db};

/// Resolves the bearer token into an [`Actor`] and stores it in the request
/// extensions. No header means `Actor::Anonymous`; a bad token is refused
/// outright. Every resolved user has `last_seen` refreshed.
pub async fn resolve_actor(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let actor = match bearer {
        None => Actor::Anonymous,
        Some(TypedHeader(Authorization(bearer))) => {
            let user_id = state
                .tokens
                .verify(bearer.token(), TokenPurpose::Session)
                .ok_or(ApiError::Unauthorized("invalid or expired session"))?;
            let user = with_db(&state, move |db| {
                let user = db.load_actor(user_id)?;
                if user.is_some() {
                    db.touch_last_seen(user_id)?;
                }
                Ok(user)
            })
            .await?;
            match user {
                Some(user) => Actor::User(user),
                None => {
                    warn!("Session token for missing user {}", user_id);
                    return Err(ApiError::Unauthorized("invalid or expired session"));
                }
            }
        }
    };

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}
