use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, warn};
use validator::Validate;

use efc_db::StoreError;
use efc_types::api::{AddChapterRequest, ChapterResponse, ChapterViewResponse, EditChapterRequest, PageQuery};
use efc_types::models::AssetKind;
use efc_types::permissions::{Actor, Permission};
use efc_types::sequence;

use crate::error::ApiResult;
use crate::guard::require_permission;
use crate::state::{AppState, with_db};

/// GET /courses/{id}/chapters/{index}
///
/// Positions before the first or past the last chapter fall back to that end
/// and say so in `notice`. Every view counts towards the course statistics.
pub async fn view_chapter(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((course_id, requested)): Path<(i64, i64)>,
    Query(paging): Query<PageQuery>,
) -> ApiResult<Json<ChapterViewResponse>> {
    require_permission(&actor, Permission::CHECK_DOWNLOAD)?;

    let per_page = state.config.comments_per_page;
    let page = paging.page.max(1);
    let (course, chapter, count, notice, (comments, total_comments)) = with_db(&state, move |db| {
        let course = db.get_course(course_id)?.ok_or(StoreError::NotFound("course"))?;
        let count = db.chapter_count(course_id)?;
        let (index, notice) = sequence::clamp_view(requested, count);
        let chapter = db
            .find_chapter_by_course_and_index(course_id, index)?
            .ok_or(StoreError::NotFound("chapter"))?;
        db.record_chapter_access(chapter.id)?;
        let comments = db.approved_comments(chapter.id, page, per_page)?;
        Ok((course, chapter, count, notice, comments))
    })
    .await?;

    if let Some(notice) = notice {
        debug!("Chapter {} of course {} requested: {}", requested, course_id, notice);
    }

    let video = state.storage.resolve(AssetKind::Video, chapter.video_filename.as_deref()).await;
    let outline = state
        .storage
        .resolve(AssetKind::Outline, chapter.outline_filename.as_deref())
        .await;

    Ok(Json(ChapterViewResponse {
        is_first: chapter.is_first(),
        is_last: chapter.is_last(count),
        chapter_count: count,
        notice: notice.map(str::to_string),
        course,
        chapter: ChapterResponse::from(chapter),
        video,
        outline,
        comments,
        page,
        per_page,
        total_comments,
    }))
}

/// POST /admin/courses/{id}/chapters
pub async fn add_chapter(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(course_id): Path<i64>,
    Json(req): Json<AddChapterRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&actor, Permission::MODERATE_COURSES)?;
    req.validate()?;
    let chapter = with_db(&state, move |db| {
        db.insert_chapter_after(course_id, req.after_index, req.name.trim(), &req.about_chapter)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(ChapterResponse::from(chapter))))
}

/// PUT /admin/chapters/{id}
pub async fn update_chapter(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(chapter_id): Path<i64>,
    Json(req): Json<EditChapterRequest>,
) -> ApiResult<Json<ChapterResponse>> {
    require_permission(&actor, Permission::MODERATE_COURSES)?;
    req.validate()?;
    let chapter = with_db(&state, move |db| {
        db.update_chapter(chapter_id, req.name.trim(), &req.about_chapter)
    })
    .await?;
    Ok(Json(ChapterResponse::from(chapter)))
}

/// DELETE /admin/chapters/{id}
pub async fn delete_chapter(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(chapter_id): Path<i64>,
) -> ApiResult<StatusCode> {
    require_permission(&actor, Permission::MODERATE_COURSES)?;
    let removed = with_db(&state, move |db| db.delete_chapter(chapter_id)).await?;
    for kind in [AssetKind::Video, AssetKind::Outline] {
        if let Some(filename) = removed.asset_filename(kind) {
            if let Err(e) = state.storage.delete(kind, filename).await {
                warn!("Failed to delete asset {}: {}", filename, e);
            }
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
