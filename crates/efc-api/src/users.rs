use axum::{
    Extension, Json,
    extract::{Path, State},
};
use validator::Validate;

use efc_db::StoreError;
use efc_db::users::AdminUserUpdate;
use efc_types::api::{AdminEditUserRequest, EditProfileRequest, ProfileResponse};
use efc_types::models::UserProfile;
use efc_types::permissions::{Actor, Permission};

use crate::error::ApiResult;
use crate::guard::{require_admin, require_user};
use crate::state::{AppState, with_db};

/// GET /users/{username}: the profile and the user's comments. Pending
/// comments and the email address are only shown to the user themselves and
/// to those who moderate or administer them.
pub async fn profile(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(username): Path<String>,
) -> ApiResult<Json<ProfileResponse>> {
    let viewer = require_user(&actor)?;
    let viewer_id = viewer.id;
    let moderator = viewer.can(Permission::MODERATE_COMMENTS);
    let admin = viewer.is_administrator();
    let (user, comments) = with_db(&state, move |db| {
        let user = db
            .find_user_by_username(&username)?
            .ok_or(StoreError::NotFound("user"))?;
        let own = user.id == viewer_id;
        let comments = db.comments_by_author(user.id, own || moderator)?;
        let mut profile = UserProfile::from(user);
        if !own && !admin {
            profile.email = None;
        }
        Ok((profile, comments))
    })
    .await?;
    Ok(Json(ProfileResponse { user, comments }))
}

/// PUT /profile
pub async fn edit_profile(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<EditProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    let user_id = require_user(&actor)?.id;
    req.validate()?;
    let user = with_db(&state, move |db| {
        db.update_profile(
            user_id,
            req.name.as_deref(),
            req.location.as_deref(),
            req.about_me.as_deref(),
        )
    })
    .await?;
    Ok(Json(user.into()))
}

/// PUT /admin/users/{id}
pub async fn admin_edit_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<i64>,
    Json(req): Json<AdminEditUserRequest>,
) -> ApiResult<Json<UserProfile>> {
    require_admin(&actor)?;
    req.validate()?;
    let user = with_db(&state, move |db| {
        db.admin_update_user(
            user_id,
            &AdminUserUpdate {
                email: &req.email,
                username: &req.username,
                confirmed: req.confirmed,
                role_id: req.role_id,
                name: req.name.as_deref(),
                location: req.location.as_deref(),
                about_me: req.about_me.as_deref(),
            },
        )
    })
    .await?;
    Ok(Json(user.into()))
}

/// GET /admin/users/frozen
pub async fn frozen_users(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    require_admin(&actor)?;
    let users = with_db(&state, |db| db.list_frozen_users()).await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

/// POST /admin/users/{id}/freeze
pub async fn freeze_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<UserProfile>> {
    set_can_comment(state, &actor, user_id, false).await
}

/// POST /admin/users/{id}/unfreeze
pub async fn unfreeze_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<UserProfile>> {
    set_can_comment(state, &actor, user_id, true).await
}

async fn set_can_comment(state: AppState, actor: &Actor, user_id: i64, can_comment: bool) -> ApiResult<Json<UserProfile>> {
    require_admin(actor)?;
    let user = with_db(&state, move |db| db.set_can_comment(user_id, can_comment)).await?;
    Ok(Json(user.into()))
}
