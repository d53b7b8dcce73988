//! Row types and row mappers. Rows that carry secrets or raw timestamp text
//! stay in this crate; the rest map straight onto `efc_types` models.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Row;
use tracing::warn;

use efc_types::models::{AssetKind, Category, Chapter, Comment, Course, Role, UserProfile};
use efc_types::permissions::Permission;

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role_id: i64,
    pub confirmed: bool,
    pub can_comment: bool,
    pub temp_email: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: String,
    pub last_seen: String,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            member_since: parse_timestamp(&row.member_since),
            last_seen: parse_timestamp(&row.last_seen),
            id: row.id,
            username: row.username,
            email: Some(row.email),
            role_id: row.role_id,
            confirmed: row.confirmed,
            can_comment: row.can_comment,
            name: row.name,
            location: row.location,
            about_me: row.about_me,
        }
    }
}

/// A blob that belonged to a chapter removed from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub kind: AssetKind,
    pub filename: String,
}

pub(crate) const USER_COLUMNS: &str = "id, email, username, password_hash, role_id, confirmed, \
     can_comment, temp_email, name, location, about_me, member_since, last_seen";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        role_id: row.get(4)?,
        confirmed: row.get(5)?,
        can_comment: row.get(6)?,
        temp_email: row.get(7)?,
        name: row.get(8)?,
        location: row.get(9)?,
        about_me: row.get(10)?,
        member_since: row.get(11)?,
        last_seen: row.get(12)?,
    })
}

pub(crate) fn role_from_row(row: &Row<'_>) -> rusqlite::Result<Role> {
    Ok(Role {
        id: row.get(0)?,
        name: row.get(1)?,
        permissions: Permission::from_stored(row.get(2)?),
        is_default: row.get(3)?,
    })
}

pub(crate) fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

pub(crate) fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        name: row.get(1)?,
        category_id: row.get(2)?,
        teacher_name: row.get(3)?,
        about_course: row.get(4)?,
    })
}

pub(crate) const CHAPTER_COLUMNS: &str =
    "id, course_id, idx, name, about_chapter, video_filename, outline_filename, access_sum";

pub(crate) fn chapter_from_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        id: row.get(0)?,
        course_id: row.get(1)?,
        index: row.get(2)?,
        name: row.get(3)?,
        about_chapter: row.get(4)?,
        video_filename: row.get(5)?,
        outline_filename: row.get(6)?,
        access_sum: row.get(7)?,
    })
}

/// Comment columns joined with the author's username; expects the comment
/// table aliased `c` and users aliased `u`.
pub(crate) const COMMENT_COLUMNS: &str =
    "c.id, c.body, c.body_html, c.timestamp, c.author_id, u.username, c.chapter_id, c.enabled";

pub(crate) fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let timestamp: String = row.get(3)?;
    Ok(Comment {
        id: row.get(0)?,
        body: row.get(1)?,
        body_html: row.get(2)?,
        timestamp: parse_timestamp(&timestamp),
        author_id: row.get(4)?,
        author_username: row
            .get::<_, Option<String>>(5)?
            .unwrap_or_else(|| "unknown".to_string()),
        chapter_id: row.get(6)?,
        enabled: row.get(7)?,
    })
}

/// Timestamps written by this crate sort lexicographically in time order.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone; it is UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_timestamp_shapes() {
        let ours = now_timestamp();
        assert!(parse_timestamp(&ours) > DateTime::<Utc>::default());

        let sqlite = parse_timestamp("2024-03-01 12:30:00");
        assert_eq!(sqlite.to_rfc3339(), "2024-03-01T12:30:00+00:00");

        assert_eq!(parse_timestamp("garbage"), DateTime::<Utc>::default());
    }
}
