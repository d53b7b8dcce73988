use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use validator::Validate;

use efc_db::StoreError;
use efc_types::api::{ApproveResponse, CommentRequest};
use efc_types::models::Comment;
use efc_types::permissions::{Actor, Permission};

use crate::error::{ApiError, ApiResult};
use crate::guard::require_permission;
use crate::state::{AppState, with_db};

/// POST /courses/{id}/chapters/{index}/comments
///
/// The comment is queued for moderation and not shown until approved.
pub async fn post_comment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((course_id, index)): Path<(i64, i64)>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let author = require_permission(&actor, Permission::COMMENT)?;
    req.validate()?;

    let author_id = author.id;
    let comment = with_db(&state, move |db| {
        let chapter = db
            .find_chapter_by_course_and_index(course_id, index)?
            .ok_or(StoreError::NotFound("chapter"))?;
        db.create_comment(author_id, chapter.id, &req.body)
    })
    .await?;

    info!("User '{}' posted comment {} (pending review)", author.username, comment.id);
    Ok((StatusCode::CREATED, Json(comment)))
}

/// PUT /comments/{id}
///
/// Authors may edit their own comments while they can still comment;
/// comment moderators may edit any.
pub async fn edit_comment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(comment_id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<Json<Comment>> {
    let user = require_permission(&actor, Permission::COMMENT)
        .or_else(|_| require_permission(&actor, Permission::MODERATE_COMMENTS))?;
    req.validate()?;

    let existing = with_db(&state, move |db| db.get_comment(comment_id))
        .await?
        .ok_or(ApiError::NotFound("comment"))?;
    let is_author = existing.author_id == user.id && user.can(Permission::COMMENT);
    if !is_author && !user.can(Permission::MODERATE_COMMENTS) {
        warn!("User '{}' tried to edit comment {} by someone else", user.username, comment_id);
        return Err(ApiError::Forbidden("permission denied"));
    }

    let comment = with_db(&state, move |db| db.update_comment_body(comment_id, &req.body)).await?;
    Ok(Json(comment))
}

/// GET /admin/comments/pending
pub async fn pending_comments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<Vec<Comment>>> {
    require_permission(&actor, Permission::MODERATE_COMMENTS)?;
    let comments = with_db(&state, |db| db.pending_comments()).await?;
    Ok(Json(comments))
}

/// POST /admin/comments/{id}/approve
pub async fn approve_comment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(comment_id): Path<i64>,
) -> ApiResult<Json<ApproveResponse>> {
    require_permission(&actor, Permission::MODERATE_COMMENTS)?;
    let (comment, changed) = with_db(&state, move |db| db.approve_comment(comment_id)).await?;
    Ok(Json(ApproveResponse { comment, changed }))
}
