//! Chapter sequencing.
//!
//! A course's chapters occupy `idx` 1..=N with no gaps. Inserts shift the tail
//! right and then fill the hole; deletes remove the row and shift the tail
//! left. Both run as one IMMEDIATE transaction on the writer connection and
//! re-check the whole sequence before committing. Any failure rolls back and
//! leaves the previous ordering in place.

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{info, warn};

use efc_types::models::{AssetKind, Chapter};
use efc_types::sequence;

use crate::catalog::query_course;
use crate::models::{CHAPTER_COLUMNS, chapter_from_row};
use crate::{Database, Result, StoreError};

impl Database {
    /// Chapters of a course in sequence order.
    pub fn list_chapters(&self, course_id: i64) -> Result<Vec<Chapter>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE course_id = ?1 ORDER BY idx"
            ))?;
            let rows = stmt
                .query_map([course_id], chapter_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn chapter_count(&self, course_id: i64) -> Result<i64> {
        self.with_conn(|conn| count_chapters(conn, course_id))
    }

    pub fn get_chapter(&self, id: i64) -> Result<Option<Chapter>> {
        self.with_conn(|conn| query_chapter(conn, id))
    }

    pub fn find_chapter_by_course_and_index(&self, course_id: i64, index: i64) -> Result<Option<Chapter>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE course_id = ?1 AND idx = ?2"),
                    [course_id, index],
                    chapter_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Inserts a chapter directly after `after_index` (0 inserts at the front).
    /// Every chapter at or past the new position moves one place right.
    pub fn insert_chapter_after(
        &self,
        course_id: i64,
        after_index: i64,
        name: &str,
        about_chapter: &str,
    ) -> Result<Chapter> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if query_course(&tx, course_id)?.is_none() {
                return Err(StoreError::NotFound("course"));
            }
            let count = count_chapters(&tx, course_id)?;
            let position = sequence::insertion_point(after_index, count)
                .ok_or(StoreError::InvalidPosition { after_index, count })?;

            let inserted = renumbering(|| {
                shift_tail(&tx, course_id, position, 1)?;
                tx.execute(
                    "INSERT INTO chapters (course_id, idx, name, about_chapter) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![course_id, position, name, about_chapter],
                )?;
                Ok(tx.last_insert_rowid())
            })?;

            let chapter = query_chapter(&tx, inserted)?.ok_or(StoreError::NotFound("chapter"))?;
            commit_verified(tx, course_id)?;

            info!(
                "Inserted chapter '{}' at position {} of course {} ({} chapters)",
                name,
                position,
                course_id,
                count + 1
            );
            Ok(chapter)
        })
    }

    /// Deletes a chapter with its comments and closes the gap. The sole
    /// chapter of a course is refused. Returns the removed chapter.
    pub fn delete_chapter(&self, chapter_id: i64) -> Result<Chapter> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let chapter = query_chapter(&tx, chapter_id)?.ok_or(StoreError::NotFound("chapter"))?;
            let count = count_chapters(&tx, chapter.course_id)?;
            if count <= 1 {
                warn!(
                    "Refused to delete chapter {} of course {}: it is the only chapter",
                    chapter.id, chapter.course_id
                );
                return Err(StoreError::CannotDeleteSoleChapter);
            }

            renumbering(|| {
                tx.execute("DELETE FROM chapters WHERE id = ?1", [chapter_id])?;
                shift_tail(&tx, chapter.course_id, chapter.index + 1, -1)
            })?;

            commit_verified(tx, chapter.course_id)?;

            info!(
                "Deleted chapter '{}' (position {}) of course {}",
                chapter.name, chapter.index, chapter.course_id
            );
            Ok(chapter)
        })
    }

    /// Edits the descriptive fields. Position is never touched here.
    pub fn update_chapter(&self, chapter_id: i64, name: &str, about_chapter: &str) -> Result<Chapter> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE chapters SET name = ?1, about_chapter = ?2 WHERE id = ?3",
                rusqlite::params![name, about_chapter, chapter_id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound("chapter"));
            }
            query_chapter(conn, chapter_id)?.ok_or(StoreError::NotFound("chapter"))
        })
    }

    /// Records the stored filename for a chapter asset and returns the one it
    /// replaced.
    pub fn set_chapter_asset(&self, chapter_id: i64, kind: AssetKind, filename: &str) -> Result<Option<String>> {
        let column = asset_column(kind);
        self.with_conn_mut(|conn| {
            let chapter = query_chapter(conn, chapter_id)?.ok_or(StoreError::NotFound("chapter"))?;
            conn.execute(
                &format!("UPDATE chapters SET {column} = ?1 WHERE id = ?2"),
                rusqlite::params![filename, chapter_id],
            )?;
            Ok(chapter.asset_filename(kind).map(str::to_string))
        })
    }

    /// Whether a chapter other than `except_chapter` already stores an asset
    /// of `kind` under `filename`.
    pub fn asset_name_in_use(&self, kind: AssetKind, filename: &str, except_chapter: i64) -> Result<bool> {
        let column = asset_column(kind);
        self.with_conn(|conn| {
            let taken = conn.query_row(
                &format!("SELECT EXISTS(SELECT 1 FROM chapters WHERE {column} = ?1 AND id != ?2)"),
                rusqlite::params![filename, except_chapter],
                |row| row.get(0),
            )?;
            Ok(taken)
        })
    }

    pub fn record_chapter_access(&self, chapter_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE chapters SET access_sum = access_sum + 1 WHERE id = ?1",
                [chapter_id],
            )?;
            Ok(())
        })
    }
}

fn count_chapters(conn: &Connection, course_id: i64) -> Result<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM chapters WHERE course_id = ?1",
        [course_id],
        |row| row.get(0),
    )?;
    Ok(n)
}

pub(crate) fn query_chapter(conn: &Connection, id: i64) -> Result<Option<Chapter>> {
    let row = conn
        .query_row(
            &format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = ?1"),
            [id],
            chapter_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Moves every chapter of the course at or past `from` by `delta`.
///
/// `UNIQUE(course_id, idx)` is checked row by row, so the shift goes through
/// negative space: first each affected row gets `-(idx + delta)`, then the
/// sign is flipped back. Chapters before `from` are not touched.
fn shift_tail(conn: &Connection, course_id: i64, from: i64, delta: i64) -> rusqlite::Result<usize> {
    let moved = conn.execute(
        "UPDATE chapters SET idx = -(idx + ?3) WHERE course_id = ?1 AND idx >= ?2",
        [course_id, from, delta],
    )?;
    conn.execute(
        "UPDATE chapters SET idx = -idx WHERE course_id = ?1 AND idx < 0",
        [course_id],
    )?;
    Ok(moved)
}

/// Runs the mutating part of a renumbering and reports SQL failures as
/// `TransactionFailure`. The caller's transaction rolls back on drop.
fn renumbering<T>(f: impl FnOnce() -> rusqlite::Result<T>) -> Result<T> {
    f().map_err(|e| StoreError::TransactionFailure(e.to_string()))
}

/// Commits only if the course's indices are exactly 1..=N.
fn commit_verified(tx: Transaction<'_>, course_id: i64) -> Result<()> {
    let indices = {
        let mut stmt = tx.prepare("SELECT idx FROM chapters WHERE course_id = ?1 ORDER BY idx")?;
        let indices = stmt
            .query_map([course_id], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        indices
    };
    if !sequence::is_contiguous(&indices) {
        warn!("Chapter sequence of course {} broken ({:?}); rolling back", course_id, indices);
        return Err(StoreError::TransactionFailure(format!(
            "course {course_id} indices not contiguous"
        )));
    }
    tx.commit()
        .map_err(|e| StoreError::TransactionFailure(e.to_string()))
}

fn asset_column(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Video => "video_filename",
        AssetKind::Outline => "outline_filename",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewCourse;
    use crate::testutil::open_temp;
    use crate::users::NewUser;
    use std::sync::Arc;

    fn course_with(db: &Database, names: &[&str]) -> i64 {
        let cat = db.create_category("Programming 101").unwrap_or_else(|_| {
            db.list_categories().unwrap().into_iter().find(|c| c.name == "Programming 101").unwrap()
        });
        let (course, first) = db
            .create_course(&NewCourse {
                name: "Rust",
                category_id: cat.id,
                teacher_name: "",
                about_course: "",
            })
            .unwrap();
        db.update_chapter(first.id, names[0], "").unwrap();
        for (i, name) in names.iter().enumerate().skip(1) {
            db.insert_chapter_after(course.id, i as i64, name, "").unwrap();
        }
        course.id
    }

    fn names(db: &Database, course_id: i64) -> Vec<(i64, String)> {
        db.list_chapters(course_id)
            .unwrap()
            .into_iter()
            .map(|c| (c.index, c.name))
            .collect()
    }

    fn assert_contiguous(db: &Database, course_id: i64) {
        let chapters = db.list_chapters(course_id).unwrap();
        let indices: Vec<i64> = chapters.iter().map(|c| c.index).collect();
        assert!(sequence::is_contiguous(&indices), "indices {:?}", indices);
        for c in &chapters {
            assert_eq!(c.prev_index(), c.index - 1);
            assert_eq!(c.next_index(), c.index + 1);
        }
    }

    #[test]
    fn insert_in_the_middle_shifts_tail() {
        let (_dir, db) = open_temp();
        let course = course_with(&db, &["one", "two", "three"]);
        let before = db.list_chapters(course).unwrap();

        let new = db.insert_chapter_after(course, 2, "new", "").unwrap();
        assert_eq!(new.index, 3);

        assert_eq!(
            names(&db, course),
            vec![
                (1, "one".to_string()),
                (2, "two".to_string()),
                (3, "new".to_string()),
                (4, "three".to_string()),
            ]
        );
        // chapters before the insertion point keep their rows untouched
        let after = db.list_chapters(course).unwrap();
        assert_eq!(after[0].id, before[0].id);
        assert_eq!(after[1].id, before[1].id);
        assert_eq!(after[3].id, before[2].id);
        assert_contiguous(&db, course);
    }

    #[test]
    fn insert_at_front_and_back() {
        let (_dir, db) = open_temp();
        let course = course_with(&db, &["one", "two"]);

        db.insert_chapter_after(course, 0, "zero", "").unwrap();
        db.insert_chapter_after(course, 3, "last", "").unwrap();

        assert_eq!(
            names(&db, course),
            vec![
                (1, "zero".to_string()),
                (2, "one".to_string()),
                (3, "two".to_string()),
                (4, "last".to_string()),
            ]
        );
        assert_contiguous(&db, course);
    }

    #[test]
    fn insert_out_of_range_changes_nothing() {
        let (_dir, db) = open_temp();
        let course = course_with(&db, &["one", "two"]);
        let before = names(&db, course);

        let res = db.insert_chapter_after(course, 5, "far", "");
        assert!(matches!(
            res,
            Err(StoreError::InvalidPosition { after_index: 5, count: 2 })
        ));
        assert!(matches!(
            db.insert_chapter_after(999, 1, "x", ""),
            Err(StoreError::NotFound("course"))
        ));
        assert_eq!(names(&db, course), before);
    }

    #[test]
    fn delete_closes_gap() {
        let (_dir, db) = open_temp();
        let course = course_with(&db, &["one", "two", "three", "four"]);
        let second = db.find_chapter_by_course_and_index(course, 2).unwrap().unwrap();

        let removed = db.delete_chapter(second.id).unwrap();
        assert_eq!(removed.name, "two");

        assert_eq!(
            names(&db, course),
            vec![
                (1, "one".to_string()),
                (2, "three".to_string()),
                (3, "four".to_string()),
            ]
        );
        assert_contiguous(&db, course);
    }

    #[test]
    fn first_chapter_can_go_when_others_remain() {
        let (_dir, db) = open_temp();
        let course = course_with(&db, &["one", "two"]);
        let first = db.find_chapter_by_course_and_index(course, 1).unwrap().unwrap();

        db.delete_chapter(first.id).unwrap();
        assert_eq!(names(&db, course), vec![(1, "two".to_string())]);
    }

    #[test]
    fn sole_chapter_is_permanent() {
        let (_dir, db) = open_temp();
        let course = course_with(&db, &["only"]);
        let only = db.find_chapter_by_course_and_index(course, 1).unwrap().unwrap();

        assert!(matches!(
            db.delete_chapter(only.id),
            Err(StoreError::CannotDeleteSoleChapter)
        ));
        assert_eq!(names(&db, course), vec![(1, "only".to_string())]);

        let edited = db.update_chapter(only.id, "renamed", "about").unwrap();
        assert_eq!(edited.index, 1);
        assert_eq!(edited.name, "renamed");
    }

    #[test]
    fn delete_cascades_comments() {
        let (_dir, db) = open_temp();
        let course = course_with(&db, &["one", "two"]);
        let second = db.find_chapter_by_course_and_index(course, 2).unwrap().unwrap();
        let user = db
            .create_user(
                &NewUser {
                    email: "c@example.com",
                    username: "c",
                    password_hash: "h",
                },
                None,
            )
            .unwrap();
        let comment = db.create_comment(user.id, second.id, "hello").unwrap();

        db.delete_chapter(second.id).unwrap();
        assert!(db.get_comment(comment.id).unwrap().is_none());
    }

    #[test]
    fn edits_leave_other_courses_alone() {
        let (_dir, db) = open_temp();
        let a = course_with(&db, &["a1", "a2", "a3"]);
        let b = course_with(&db, &["b1", "b2", "b3"]);

        db.insert_chapter_after(a, 1, "a-new", "").unwrap();
        let a3 = db.find_chapter_by_course_and_index(a, 3).unwrap().unwrap();
        db.delete_chapter(a3.id).unwrap();

        assert_eq!(
            names(&db, b),
            vec![(1, "b1".to_string()), (2, "b2".to_string()), (3, "b3".to_string())]
        );
        assert_contiguous(&db, a);
    }

    #[test]
    fn failed_shift_rolls_back_whole_edit() {
        let (_dir, db) = open_temp();
        let course = course_with(&db, &["one", "two", "three"]);
        let before = names(&db, course);
        let two = db.find_chapter_by_course_and_index(course, 2).unwrap().unwrap();

        // Let the first half of the shift through, fail the sign flip.
        db.with_conn_mut(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER block_flip BEFORE UPDATE OF idx ON chapters
                 WHEN OLD.idx < 0
                 BEGIN SELECT RAISE(ABORT, 'flip blocked'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            db.insert_chapter_after(course, 1, "new", ""),
            Err(StoreError::TransactionFailure(_))
        ));
        assert_eq!(names(&db, course), before);

        assert!(matches!(db.delete_chapter(two.id), Err(StoreError::TransactionFailure(_))));
        assert_eq!(names(&db, course), before);

        db.with_conn_mut(|conn| {
            conn.execute_batch("DROP TRIGGER block_flip;")?;
            Ok(())
        })
        .unwrap();
        db.insert_chapter_after(course, 1, "new", "").unwrap();
        assert_contiguous(&db, course);
    }

    #[test]
    fn asset_replacement_returns_previous() {
        let (_dir, db) = open_temp();
        let course = course_with(&db, &["one"]);
        let ch = db.find_chapter_by_course_and_index(course, 1).unwrap().unwrap();

        assert_eq!(db.set_chapter_asset(ch.id, AssetKind::Outline, "a.pdf").unwrap(), None);
        assert_eq!(
            db.set_chapter_asset(ch.id, AssetKind::Outline, "b.pdf").unwrap().as_deref(),
            Some("a.pdf")
        );
        let ch = db.get_chapter(ch.id).unwrap().unwrap();
        assert_eq!(ch.outline_filename.as_deref(), Some("b.pdf"));
        assert_eq!(ch.video_filename, None);
        assert_eq!(ch.index, 1);
    }

    #[test]
    fn asset_names_in_use_by_other_chapters() {
        let (_dir, db) = open_temp();
        let course = course_with(&db, &["one", "two"]);
        let one = db.find_chapter_by_course_and_index(course, 1).unwrap().unwrap();
        let two = db.find_chapter_by_course_and_index(course, 2).unwrap().unwrap();
        db.set_chapter_asset(one.id, AssetKind::Video, "c_1_one.mp4").unwrap();

        assert!(db.asset_name_in_use(AssetKind::Video, "c_1_one.mp4", two.id).unwrap());
        assert!(!db.asset_name_in_use(AssetKind::Video, "c_1_one.mp4", one.id).unwrap());
        assert!(!db.asset_name_in_use(AssetKind::Outline, "c_1_one.mp4", two.id).unwrap());
    }

    #[test]
    fn concurrent_structural_edits_stay_contiguous() {
        let (_dir, db) = open_temp();
        let db = Arc::new(db);
        let course = course_with(&db, &["one"]);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let db = db.clone();
                std::thread::spawn(move || {
                    for i in 0..5 {
                        db.insert_chapter_after(course, 1, &format!("t{t}-{i}"), "").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(db.chapter_count(course).unwrap(), 41);
        assert_contiguous(&db, course);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        let second = db.find_chapter_by_course_and_index(course, 2).unwrap();
                        if let Some(ch) = second {
                            // another thread may have removed it first
                            let _ = db.delete_chapter(ch.id);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_contiguous(&db, course);
    }
}
