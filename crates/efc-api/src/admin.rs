use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;

use efc_types::api::{RoleChangeResponse, RolePermissionRequest};
use efc_types::models::{CourseAccessStat, Role};
use efc_types::permissions::{Actor, Permission};

use crate::error::{ApiError, ApiResult};
use crate::guard::{require_admin, require_permission};
use crate::state::{AppState, with_db};

// -- Roles --

pub async fn list_roles(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<Vec<Role>>> {
    require_admin(&actor)?;
    let roles = with_db(&state, |db| db.list_roles()).await?;
    Ok(Json(roles))
}

/// POST /admin/roles/{id}/grant. Granting a bit the role already holds
/// reports `changed: false`.
pub async fn grant_permission(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(role_id): Path<i64>,
    Json(req): Json<RolePermissionRequest>,
) -> ApiResult<Json<RoleChangeResponse>> {
    let admin = require_admin(&actor)?;
    let permission = parse_permission(&req.permission)?;
    let (role, changed) = with_db(&state, move |db| db.grant_permission(role_id, permission)).await?;
    if changed {
        info!("'{}' granted {} to role '{}'", admin.username, req.permission, role.name);
    }
    Ok(Json(RoleChangeResponse { role, changed }))
}

/// POST /admin/roles/{id}/revoke
pub async fn revoke_permission(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(role_id): Path<i64>,
    Json(req): Json<RolePermissionRequest>,
) -> ApiResult<Json<RoleChangeResponse>> {
    let admin = require_admin(&actor)?;
    let permission = parse_permission(&req.permission)?;
    let (role, changed) = with_db(&state, move |db| db.revoke_permission(role_id, permission)).await?;
    if changed {
        info!("'{}' revoked {} from role '{}'", admin.username, req.permission, role.name);
    }
    Ok(Json(RoleChangeResponse { role, changed }))
}

/// POST /admin/roles/{id}/default
pub async fn set_default_role(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(role_id): Path<i64>,
) -> ApiResult<Json<Role>> {
    require_admin(&actor)?;
    let role = with_db(&state, move |db| db.set_default_role(role_id)).await?;
    Ok(Json(role))
}

// -- Statistics --

/// GET /admin/stats: chapter views summed per course.
pub async fn course_stats(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<Vec<CourseAccessStat>>> {
    require_permission(&actor, Permission::QUERY_STATISTICS)?;
    let stats = with_db(&state, |db| db.course_access_stats()).await?;
    Ok(Json(stats))
}

fn parse_permission(name: &str) -> ApiResult<Permission> {
    Permission::from_snake_name(name).ok_or_else(|| ApiError::Validation(format!("unknown permission '{name}'")))
}
