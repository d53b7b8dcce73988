use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use efc_types::models::Comment;

use crate::chapters::query_chapter;
use crate::markdown::render_comment;
use crate::models::{COMMENT_COLUMNS, comment_from_row, now_timestamp};
use crate::{Database, Result, StoreError};

impl Database {
    /// New comments start pending and stay invisible to viewers until a
    /// moderator approves them.
    pub fn create_comment(&self, author_id: i64, chapter_id: i64, body: &str) -> Result<Comment> {
        let body_html = render_comment(body);
        self.with_conn_mut(|conn| {
            if query_chapter(conn, chapter_id)?.is_none() {
                return Err(StoreError::NotFound("chapter"));
            }
            conn.execute(
                "INSERT INTO comments (body, body_html, timestamp, author_id, chapter_id, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                rusqlite::params![body, body_html, now_timestamp(), author_id, chapter_id],
            )?;
            let id = conn.last_insert_rowid();
            query_comment(conn, id)?.ok_or(StoreError::NotFound("comment"))
        })
    }

    /// Replaces the body; the HTML copy is always re-rendered with it.
    pub fn update_comment_body(&self, comment_id: i64, body: &str) -> Result<Comment> {
        let body_html = render_comment(body);
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE comments SET body = ?1, body_html = ?2 WHERE id = ?3",
                rusqlite::params![body, body_html, comment_id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound("comment"));
            }
            query_comment(conn, comment_id)?.ok_or(StoreError::NotFound("comment"))
        })
    }

    pub fn get_comment(&self, comment_id: i64) -> Result<Option<Comment>> {
        self.with_conn(|conn| query_comment(conn, comment_id))
    }

    /// Pending -> approved. There is no way back. `changed` is false when the
    /// comment was already approved.
    pub fn approve_comment(&self, comment_id: i64) -> Result<(Comment, bool)> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE comments SET enabled = 1 WHERE id = ?1 AND enabled = 0",
                [comment_id],
            )?;
            let comment = query_comment(conn, comment_id)?.ok_or(StoreError::NotFound("comment"))?;
            if n > 0 {
                info!("Approved comment {} on chapter {}", comment.id, comment.chapter_id);
            }
            Ok((comment, n > 0))
        })
    }

    /// The global moderation queue, newest first.
    pub fn pending_comments(&self) -> Result<Vec<Comment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMMENT_COLUMNS}
                 FROM comments c
                 LEFT JOIN users u ON u.id = c.author_id
                 WHERE c.enabled = 0
                 ORDER BY c.timestamp DESC, c.id DESC"
            ))?;
            let rows = stmt
                .query_map([], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One page (1-based) of a chapter's approved comments, newest first,
    /// plus the total number of approved comments.
    pub fn approved_comments(&self, chapter_id: i64, page: u32, per_page: u32) -> Result<(Vec<Comment>, i64)> {
        let per_page = per_page.max(1);
        let offset = i64::from(page.max(1) - 1) * i64::from(per_page);
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE chapter_id = ?1 AND enabled = 1",
                [chapter_id],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMMENT_COLUMNS}
                 FROM comments c
                 LEFT JOIN users u ON u.id = c.author_id
                 WHERE c.chapter_id = ?1 AND c.enabled = 1
                 ORDER BY c.timestamp DESC, c.id DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![chapter_id, i64::from(per_page), offset],
                    comment_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    /// A user's comments, newest first. Pending ones are left out unless
    /// `include_pending` is set.
    pub fn comments_by_author(&self, author_id: i64, include_pending: bool) -> Result<Vec<Comment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMMENT_COLUMNS}
                 FROM comments c
                 LEFT JOIN users u ON u.id = c.author_id
                 WHERE c.author_id = ?1 AND (?2 OR c.enabled = 1)
                 ORDER BY c.timestamp DESC, c.id DESC"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![author_id, include_pending], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_comment(conn: &Connection, id: i64) -> Result<Option<Comment>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {COMMENT_COLUMNS}
                 FROM comments c
                 LEFT JOIN users u ON u.id = c.author_id
                 WHERE c.id = ?1"
            ),
            [id],
            comment_from_row,
        )
        .optional()?;
    Ok(row)
}
