use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::{error, info};

use efc_db::StoreError;
use efc_types::api::UploadResponse;
use efc_types::models::AssetKind;
use efc_types::permissions::{Actor, Permission};

use crate::error::{ApiError, ApiResult};
use crate::guard::require_permission;
use crate::state::{AppState, with_db};
use crate::storage::Storage;

/// PUT /admin/chapters/{id}/{kind} with the raw file as the body.
///
/// The previous file is removed before the new one is written under a name
/// derived from the course, the chapter position and the chapter name. A name
/// another chapter still holds is never reused.
pub async fn upload_asset(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((chapter_id, kind)): Path<(i64, String)>,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    require_permission(&actor, Permission::MODERATE_COURSES)?;
    let kind = AssetKind::parse(&kind).ok_or(ApiError::NotFound("asset kind"))?;

    if bytes.is_empty() {
        return Err(ApiError::Validation("upload is empty".into()));
    }
    let limit = state.config.max_upload_bytes;
    if bytes.len() > limit {
        return Err(ApiError::PayloadTooLarge { limit });
    }

    let (course, chapter, filename) = with_db(&state, move |db| {
        let chapter = db.get_chapter(chapter_id)?.ok_or(StoreError::NotFound("chapter"))?;
        let course = db.get_course(chapter.course_id)?.ok_or(StoreError::NotFound("course"))?;
        let candidates = Storage::name_candidates(&course.name, chapter.index, &chapter.name, chapter.id, kind);
        for candidate in candidates {
            if !db.asset_name_in_use(kind, &candidate, chapter.id)? {
                return Ok((course, chapter, candidate));
            }
        }
        Err(StoreError::Conflict { field: "filename" })
    })
    .await?;

    if let Some(previous) = chapter.asset_filename(kind) {
        state.storage.delete(kind, previous).await.map_err(|e| {
            error!("Failed to remove previous asset {}: {}", previous, e);
            ApiError::Internal(e.to_string())
        })?;
    }

    let size = state.storage.save(kind, &filename, &bytes).await.map_err(|e| {
        error!("Failed to store asset {}: {}", filename, e);
        ApiError::Internal(e.to_string())
    })?;

    let stored = filename.clone();
    with_db(&state, move |db| db.set_chapter_asset(chapter_id, kind, &stored)).await?;
    info!(
        "Uploaded {:?} for chapter {} of course '{}' as {}",
        kind, chapter.index, course.name, filename
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            chapter_id,
            url: Storage::url(kind, &filename),
            filename,
            size,
        }),
    ))
}

/// GET /assets/{kind}/{filename}
pub async fn download_asset(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((kind, filename)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&actor, Permission::CHECK_DOWNLOAD)?;
    let kind = AssetKind::parse(&kind).ok_or(ApiError::NotFound("asset kind"))?;

    let bytes = state
        .storage
        .read(kind, &filename)
        .await
        .map_err(|e| {
            error!("Failed to read asset {}: {}", filename, e);
            ApiError::Internal(e.to_string())
        })?
        .ok_or(ApiError::NotFound("asset"))?;

    Ok(([(header::CONTENT_TYPE, kind.content_type())], bytes))
}
