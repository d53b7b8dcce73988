pub mod actor;
pub mod admin;
pub mod assets;
pub mod auth;
pub mod catalog;
pub mod chapters;
pub mod comments;
pub mod config;
pub mod error;
pub mod guard;
pub mod mail;
pub mod state;
pub mod storage;
pub mod tokens;
pub mod users;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
};
use serde_json::{Value, json};

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner};

/// All HTTP routes. Everything except the account entry points runs behind
/// [`actor::resolve_actor`]; per-route permissions are checked in the handlers.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/password-reset", post(auth::request_password_reset))
        .route("/auth/password-reset/confirm", post(auth::reset_password));

    let user_routes = Router::new()
        .route("/auth/confirm", post(auth::resend_confirmation))
        .route("/auth/confirm/{token}", post(auth::confirm))
        .route("/auth/change-password", post(auth::change_password))
        .route("/auth/change-email", post(auth::request_email_change))
        .route("/auth/change-email/{token}", post(auth::confirm_email_change))
        .route("/categories", get(catalog::list_categories))
        .route("/categories/{id}/courses", get(catalog::category_courses))
        .route("/courses/{id}", get(catalog::course_detail))
        .route("/courses/{id}/chapters/{index}", get(chapters::view_chapter))
        .route("/courses/{id}/chapters/{index}/comments", post(comments::post_comment))
        .route("/comments/{id}", put(comments::edit_comment))
        .route("/users/{username}", get(users::profile))
        .route("/profile", put(users::edit_profile))
        .route("/assets/{kind}/{filename}", get(assets::download_asset));

    let admin_routes = Router::new()
        .route("/admin/categories", post(catalog::create_category))
        .route(
            "/admin/categories/{id}",
            put(catalog::rename_category).delete(catalog::delete_category),
        )
        .route("/admin/courses", post(catalog::create_course))
        .route(
            "/admin/courses/{id}",
            put(catalog::update_course).delete(catalog::delete_course),
        )
        .route("/admin/courses/{id}/chapters", post(chapters::add_chapter))
        .route(
            "/admin/chapters/{id}",
            put(chapters::update_chapter).delete(chapters::delete_chapter),
        )
        .route("/admin/chapters/{id}/{kind}", put(assets::upload_asset))
        .route("/admin/comments/pending", get(comments::pending_comments))
        .route("/admin/comments/{id}/approve", post(comments::approve_comment))
        .route("/admin/users/frozen", get(users::frozen_users))
        .route("/admin/users/{id}", put(users::admin_edit_user))
        .route("/admin/users/{id}/freeze", post(users::freeze_user))
        .route("/admin/users/{id}/unfreeze", post(users::unfreeze_user))
        .route("/admin/roles", get(admin::list_roles))
        .route("/admin/roles/{id}/grant", post(admin::grant_permission))
        .route("/admin/roles/{id}/revoke", post(admin::revoke_permission))
        .route("/admin/roles/{id}/default", post(admin::set_default_role))
        .route("/admin/stats", get(admin::course_stats));

    let protected_routes = user_routes
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), actor::resolve_actor));

    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
