use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::{info, warn};
use validator::Validate;

use efc_db::users::NewUser;
use efc_types::api::{
    ChangePasswordRequest, EmailRequest, LoginRequest, LoginResponse, MessageResponse,
    PasswordResetConfirmRequest, RegisterRequest, RegisterResponse, TokenPurpose,
};
use efc_types::permissions::Actor;

use crate::error::{ApiError, ApiResult};
use crate::guard::require_user;
use crate::mail::Mail;
use crate::state::{AppState, with_db};

const INVALID_TOKEN: ApiError = ApiError::Unauthorized("the link is invalid or has expired");

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let password_hash = hash_password(&req.password)?;
    let admin_email = state.config.admin_email.clone();
    let RegisterRequest { email, username, .. } = req;
    let user = with_db(&state, move |db| {
        db.create_user(
            &NewUser {
                email: &email,
                username: &username,
                password_hash: &password_hash,
            },
            admin_email.as_deref(),
        )
    })
    .await?;

    let token = state.tokens.generate(user.id, TokenPurpose::Confirm)?;
    state.mailer.send(Mail {
        to: user.email.clone(),
        subject: "Confirm Your Account".into(),
        template: "auth/email/confirm",
        context: json!({ "username": user.username, "token": token }),
    });

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            confirmation_sent: true,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let email = req.email.clone();
    let user = with_db(&state, move |db| db.find_user_by_email(&email)).await?;
    let Some(user) = user.filter(|u| verify_password(&req.password, &u.password_hash)) else {
        warn!("Failed login for {}", req.email);
        return Err(ApiError::Unauthorized("invalid email or password"));
    };

    let token = state.tokens.generate(user.id, TokenPurpose::Session)?;
    info!("User '{}' logged in", user.username);
    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
    }))
}

/// Sends a fresh confirmation link to the signed-in user.
pub async fn resend_confirmation(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<MessageResponse>> {
    let user = require_user(&actor)?;
    if user.confirmed {
        return Ok(Json(MessageResponse::new("account already confirmed")));
    }

    let token = state.tokens.generate(user.id, TokenPurpose::Confirm)?;
    state.mailer.send(Mail {
        to: user.email.clone(),
        subject: "Confirm Your Account".into(),
        template: "auth/email/confirm",
        context: json!({ "username": user.username, "token": token }),
    });
    Ok(Json(MessageResponse::new("a new confirmation email has been sent")))
}

pub async fn confirm(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(token): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let user = require_user(&actor)?;
    if state.tokens.verify(&token, TokenPurpose::Confirm) != Some(user.id) {
        return Err(INVALID_TOKEN);
    }

    let user_id = user.id;
    let changed = with_db(&state, move |db| db.confirm_user(user_id)).await?;
    Ok(Json(MessageResponse::new(if changed {
        "you have confirmed your account"
    } else {
        "account already confirmed"
    })))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let user_id = require_user(&actor)?.id;
    req.validate()?;

    let row = with_db(&state, move |db| db.get_user(user_id))
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    if !verify_password(&req.old_password, &row.password_hash) {
        return Err(ApiError::Forbidden("current password is incorrect"));
    }

    let password_hash = hash_password(&req.new_password)?;
    with_db(&state, move |db| db.set_password_hash(user_id, &password_hash)).await?;
    info!("User '{}' changed their password", row.username);
    Ok(Json(MessageResponse::new("your password has been updated")))
}

/// Always answers the same way so the endpoint cannot be used to probe for
/// registered addresses.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let email = req.email.clone();
    if let Some(user) = with_db(&state, move |db| db.find_user_by_email(&email)).await? {
        let token = state.tokens.generate(user.id, TokenPurpose::ResetPassword)?;
        state.mailer.send(Mail {
            to: user.email,
            subject: "Reset Your Password".into(),
            template: "auth/email/reset_password",
            context: json!({ "username": user.username, "token": token }),
        });
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "an email with instructions to reset your password has been sent",
        )),
    ))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirmRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;
    let user_id = state
        .tokens
        .verify(&req.token, TokenPurpose::ResetPassword)
        .ok_or(INVALID_TOKEN)?;

    let password_hash = hash_password(&req.new_password)?;
    with_db(&state, move |db| db.set_password_hash(user_id, &password_hash)).await?;
    info!("Password reset for user {}", user_id);
    Ok(Json(MessageResponse::new("your password has been updated")))
}

/// Parks the new address and mails a confirmation link to it.
pub async fn request_email_change(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = require_user(&actor)?;
    req.validate()?;

    let user_id = user.id;
    let new_email = req.email.clone();
    with_db(&state, move |db| db.set_temp_email(user_id, &new_email)).await?;

    let token = state.tokens.generate_email_change(user_id, &req.email)?;
    state.mailer.send(Mail {
        to: req.email,
        subject: "Confirm your email address".into(),
        template: "auth/email/change_email",
        context: json!({ "username": user.username, "token": token }),
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "an email with instructions to confirm your new address has been sent",
        )),
    ))
}

pub async fn confirm_email_change(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(token): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let user = require_user(&actor)?;
    let Some((token_user, email)) = state.tokens.verify_email_change(&token) else {
        return Err(INVALID_TOKEN);
    };
    if token_user != user.id {
        return Err(INVALID_TOKEN);
    }

    let user_id = user.id;
    let new_email = with_db(&state, move |db| db.apply_email_change(user_id, &email))
        .await?
        .ok_or(ApiError::NotFound("pending email change"))?;
    Ok(Json(MessageResponse::new(format!(
        "your email address is now {new_email}"
    ))))
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}
