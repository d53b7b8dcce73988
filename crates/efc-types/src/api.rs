use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{AssetRef, Category, Chapter, Comment, Course, Role, UserProfile};

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.]*$").expect("username pattern is valid"));

// -- Tokens --

/// What a signed token may be used for. A token minted for one purpose is
/// rejected everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Session,
    Confirm,
    ResetPassword,
    ChangeEmail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub purpose: TokenPurpose,
    pub exp: usize,
    /// Address a change-email link was mailed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// -- Auth --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64), email)]
    pub email: String,
    #[validate(length(min = 1, max = 64), regex(path = *USERNAME_REGEX))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub confirmation_sent: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64), email)]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EmailRequest {
    #[validate(length(min = 1, max = 64), email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

// -- Profiles --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EditProfileRequest {
    #[validate(length(max = 64))]
    pub name: Option<String>,
    #[validate(length(max = 64))]
    pub location: Option<String>,
    pub about_me: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AdminEditUserRequest {
    #[validate(length(min = 1, max = 64), email)]
    pub email: String,
    #[validate(length(min = 1, max = 64), regex(path = *USERNAME_REGEX))]
    pub username: String,
    pub confirmed: bool,
    pub role_id: i64,
    #[validate(length(max = 64))]
    pub name: Option<String>,
    #[validate(length(max = 64))]
    pub location: Option<String>,
    pub about_me: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: UserProfile,
    pub comments: Vec<Comment>,
}

// -- Roles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolePermissionRequest {
    /// snake_case permission name, e.g. `moderate_comments`
    pub permission: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleChangeResponse {
    pub role: Role,
    pub changed: bool,
}

// -- Catalog --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CourseRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    pub category_id: i64,
    #[validate(length(max = 64))]
    #[serde(default)]
    pub teacher_name: String,
    #[serde(default)]
    pub about_course: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryCoursesResponse {
    pub category: Category,
    pub courses: Vec<Course>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AddChapterRequest {
    /// Index of the chapter the new one follows; 0 inserts at the front.
    pub after_index: i64,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[serde(default)]
    pub about_chapter: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EditChapterRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[serde(default)]
    pub about_chapter: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChapterResponse {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub prev_index: i64,
    pub next_index: i64,
}

impl From<Chapter> for ChapterResponse {
    fn from(chapter: Chapter) -> Self {
        Self {
            prev_index: chapter.prev_index(),
            next_index: chapter.next_index(),
            chapter,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CourseDetailResponse {
    pub course: Course,
    pub chapters: Vec<ChapterResponse>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "first_page")]
    pub page: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChapterViewResponse {
    pub course: Course,
    pub chapter: ChapterResponse,
    pub chapter_count: i64,
    pub is_first: bool,
    pub is_last: bool,
    /// Set when the requested index ran past either end of the course.
    pub notice: Option<String>,
    pub video: AssetRef,
    pub outline: AssetRef,
    pub comments: Vec<Comment>,
    pub page: u32,
    pub per_page: u32,
    pub total_comments: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub chapter_id: i64,
    pub filename: String,
    pub size: u64,
    pub url: String,
}

// -- Comments --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CommentRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub body: String,
}

fn validate_not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        Err(validator::ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub comment: Comment,
    pub changed: bool,
}
