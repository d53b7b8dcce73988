use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::permissions::Permission;
use crate::sequence;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub permissions: Permission,
    pub is_default: bool,
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    /// Only shown to the user themselves and to administrators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role_id: i64,
    pub confirmed: bool,
    pub can_comment: bool,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    pub teacher_name: String,
    pub about_course: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub course_id: i64,
    pub index: i64,
    pub name: String,
    pub about_chapter: String,
    pub video_filename: Option<String>,
    pub outline_filename: Option<String>,
    pub access_sum: i64,
}

impl Chapter {
    pub fn prev_index(&self) -> i64 {
        sequence::prev_index(self.index)
    }

    pub fn next_index(&self) -> i64 {
        sequence::next_index(self.index)
    }

    pub fn is_first(&self) -> bool {
        self.index == 1
    }

    pub fn is_last(&self, chapter_count: i64) -> bool {
        self.index == chapter_count
    }

    pub fn asset_filename(&self, kind: AssetKind) -> Option<&str> {
        match kind {
            AssetKind::Video => self.video_filename.as_deref(),
            AssetKind::Outline => self.outline_filename.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub body: String,
    pub body_html: String,
    pub timestamp: DateTime<Utc>,
    pub author_id: i64,
    pub author_username: String,
    pub chapter_id: i64,
    pub enabled: bool,
}

/// The two kinds of per-chapter upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Video,
    Outline,
}

impl AssetKind {
    /// The only extension accepted for this kind.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Outline => "pdf",
        }
    }

    /// Storage subdirectory and URL segment.
    pub const fn dir(self) -> &'static str {
        match self {
            Self::Video => "videos",
            Self::Outline => "outlines",
        }
    }

    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Outline => "application/pdf",
        }
    }

    /// Accepts both the singular kind name and the plural directory name.
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "video" | "videos" => Some(Self::Video),
            "outline" | "outlines" => Some(Self::Outline),
            _ => None,
        }
    }
}

/// Result of resolving a stored asset filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssetRef {
    Available { url: String },
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseAccessStat {
    pub course_id: i64,
    pub course_name: String,
    pub access_total: i64,
}
