use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use efc_db::StoreError;
use efc_db::catalog::NewCourse;
use efc_types::api::{CategoryCoursesResponse, CategoryRequest, ChapterResponse, CourseDetailResponse, CourseRequest};
use efc_types::models::{Category, Course};
use efc_types::permissions::{Actor, Permission};

use crate::error::ApiResult;
use crate::guard::{require_permission, require_user};
use crate::state::{AppState, with_db};

// -- Browsing --

pub async fn list_categories(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<Vec<Category>>> {
    require_user(&actor)?;
    let categories = with_db(&state, |db| db.list_categories()).await?;
    Ok(Json(categories))
}

pub async fn category_courses(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(category_id): Path<i64>,
) -> ApiResult<Json<CategoryCoursesResponse>> {
    require_permission(&actor, Permission::CHECK_DOWNLOAD)?;
    let (category, courses) = with_db(&state, move |db| {
        let category = db.get_category(category_id)?.ok_or(StoreError::NotFound("category"))?;
        let courses = db.list_courses(category_id)?;
        Ok((category, courses))
    })
    .await?;
    Ok(Json(CategoryCoursesResponse { category, courses }))
}

pub async fn course_detail(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(course_id): Path<i64>,
) -> ApiResult<Json<CourseDetailResponse>> {
    require_permission(&actor, Permission::CHECK_DOWNLOAD)?;
    let (course, chapters) = with_db(&state, move |db| {
        let course = db.get_course(course_id)?.ok_or(StoreError::NotFound("course"))?;
        let chapters = db.list_chapters(course_id)?;
        Ok((course, chapters))
    })
    .await?;
    Ok(Json(CourseDetailResponse {
        course,
        chapters: chapters.into_iter().map(ChapterResponse::from).collect(),
    }))
}

// -- Category administration --

pub async fn create_category(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&actor, Permission::MODERATE_COURSES)?;
    req.validate()?;
    let category = with_db(&state, move |db| db.create_category(req.name.trim())).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn rename_category(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(category_id): Path<i64>,
    Json(req): Json<CategoryRequest>,
) -> ApiResult<Json<Category>> {
    require_permission(&actor, Permission::MODERATE_COURSES)?;
    req.validate()?;
    let category = with_db(&state, move |db| db.rename_category(category_id, req.name.trim())).await?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(category_id): Path<i64>,
) -> ApiResult<StatusCode> {
    require_permission(&actor, Permission::MODERATE_COURSES)?;
    let assets = with_db(&state, move |db| db.delete_category(category_id)).await?;
    state.storage.delete_all(&assets).await;
    Ok(StatusCode::NO_CONTENT)
}

// -- Course administration --

pub async fn create_course(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CourseRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&actor, Permission::MODERATE_COURSES)?;
    req.validate()?;
    let (course, first) = with_db(&state, move |db| db.create_course(&new_course(&req))).await?;
    Ok((
        StatusCode::CREATED,
        Json(CourseDetailResponse {
            course,
            chapters: vec![ChapterResponse::from(first)],
        }),
    ))
}

/// Edits a course's fields; a different `category_id` moves it.
pub async fn update_course(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(course_id): Path<i64>,
    Json(req): Json<CourseRequest>,
) -> ApiResult<Json<Course>> {
    require_permission(&actor, Permission::MODERATE_COURSES)?;
    req.validate()?;
    let course = with_db(&state, move |db| db.update_course(course_id, &new_course(&req))).await?;
    Ok(Json(course))
}

pub async fn delete_course(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(course_id): Path<i64>,
) -> ApiResult<StatusCode> {
    require_permission(&actor, Permission::MODERATE_COURSES)?;
    let (_, assets) = with_db(&state, move |db| db.delete_course(course_id)).await?;
    state.storage.delete_all(&assets).await;
    Ok(StatusCode::NO_CONTENT)
}

fn new_course(req: &CourseRequest) -> NewCourse<'_> {
    NewCourse {
        name: req.name.trim(),
        category_id: req.category_id,
        teacher_name: req.teacher_name.trim(),
        about_course: &req.about_course,
    }
}

