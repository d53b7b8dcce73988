use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use efc_types::models::{AssetKind, Category, Chapter, Course, CourseAccessStat};

use crate::error::unique_violation;
use crate::models::{StoredAsset, category_from_row, course_from_row};
use crate::{Database, Result, StoreError};

const CATEGORY_UNIQUE: &[(&str, &'static str)] = &[("categories.name", "name")];
const COURSE_COLUMNS: &str = "id, name, category_id, teacher_name, about_course";

/// Chapter created alongside every course. It can be edited but, while it is
/// the only chapter, never deleted.
pub const FIRST_CHAPTER_NAME: &str = "Introduction";
pub const FIRST_CHAPTER_ABOUT: &str = "Default content";

pub struct NewCourse<'a> {
    pub name: &'a str,
    pub category_id: i64,
    pub teacher_name: &'a str,
    pub about_course: &'a str,
}

impl Database {
    // -- Categories --

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY id")?;
            let rows = stmt
                .query_map([], category_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_category(&self, id: i64) -> Result<Option<Category>> {
        self.with_conn(|conn| query_category(conn, id))
    }

    pub fn create_category(&self, name: &str) -> Result<Category> {
        self.with_conn_mut(|conn| {
            conn.execute("INSERT INTO categories (name) VALUES (?1)", [name])
                .map_err(|e| unique_violation(e, CATEGORY_UNIQUE))?;
            let id = conn.last_insert_rowid();
            info!("Added category '{}'", name);
            Ok(Category {
                id,
                name: name.to_string(),
            })
        })
    }

    pub fn rename_category(&self, id: i64, name: &str) -> Result<Category> {
        self.with_conn_mut(|conn| {
            let n = conn
                .execute(
                    "UPDATE categories SET name = ?1 WHERE id = ?2",
                    rusqlite::params![name, id],
                )
                .map_err(|e| unique_violation(e, CATEGORY_UNIQUE))?;
            if n == 0 {
                return Err(StoreError::NotFound("category"));
            }
            Ok(Category {
                id,
                name: name.to_string(),
            })
        })
    }

    /// Deletes the category with all its courses, chapters and comments.
    /// Returns the assets of the removed chapters so their files can go too.
    pub fn delete_category(&self, id: i64) -> Result<Vec<StoredAsset>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let assets = collect_assets(
                &tx,
                "SELECT ch.video_filename, ch.outline_filename
                 FROM chapters ch
                 JOIN courses co ON co.id = ch.course_id
                 WHERE co.category_id = ?1",
                id,
            )?;
            let n = tx.execute("DELETE FROM categories WHERE id = ?1", [id])?;
            if n == 0 {
                return Err(StoreError::NotFound("category"));
            }
            tx.commit()?;
            info!("Deleted category {} and everything under it", id);
            Ok(assets)
        })
    }

    // -- Courses --

    pub fn list_courses(&self, category_id: i64) -> Result<Vec<Course>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COURSE_COLUMNS} FROM courses WHERE category_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map([category_id], course_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_course(&self, id: i64) -> Result<Option<Course>> {
        self.with_conn(|conn| query_course(conn, id))
    }

    /// Creates the course together with its first chapter.
    pub fn create_course(&self, new: &NewCourse<'_>) -> Result<(Course, Chapter)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_category(&tx, new.category_id)?.is_none() {
                return Err(StoreError::NotFound("category"));
            }
            tx.execute(
                "INSERT INTO courses (name, category_id, teacher_name, about_course)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![new.name, new.category_id, new.teacher_name, new.about_course],
            )?;
            let course_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO chapters (course_id, idx, name, about_chapter) VALUES (?1, 1, ?2, ?3)",
                rusqlite::params![course_id, FIRST_CHAPTER_NAME, FIRST_CHAPTER_ABOUT],
            )?;
            let chapter_id = tx.last_insert_rowid();
            tx.commit()?;

            info!("Added course '{}' (id {})", new.name, course_id);
            Ok((
                Course {
                    id: course_id,
                    name: new.name.to_string(),
                    category_id: new.category_id,
                    teacher_name: new.teacher_name.to_string(),
                    about_course: new.about_course.to_string(),
                },
                Chapter {
                    id: chapter_id,
                    course_id,
                    index: 1,
                    name: FIRST_CHAPTER_NAME.to_string(),
                    about_chapter: FIRST_CHAPTER_ABOUT.to_string(),
                    video_filename: None,
                    outline_filename: None,
                    access_sum: 0,
                },
            ))
        })
    }

    pub fn update_course(&self, id: i64, update: &NewCourse<'_>) -> Result<Course> {
        self.with_conn_mut(|conn| {
            if query_category(conn, update.category_id)?.is_none() {
                return Err(StoreError::NotFound("category"));
            }
            let n = conn.execute(
                "UPDATE courses SET name = ?1, category_id = ?2, teacher_name = ?3, about_course = ?4
                 WHERE id = ?5",
                rusqlite::params![
                    update.name,
                    update.category_id,
                    update.teacher_name,
                    update.about_course,
                    id
                ],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound("course"));
            }
            query_course(conn, id)?.ok_or(StoreError::NotFound("course"))
        })
    }

    /// Deletes the course with its chapters and comments. Returns the assets of
    /// the removed chapters.
    pub fn delete_course(&self, id: i64) -> Result<(Course, Vec<StoredAsset>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let course = query_course(&tx, id)?.ok_or(StoreError::NotFound("course"))?;
            let assets = collect_assets(
                &tx,
                "SELECT video_filename, outline_filename FROM chapters WHERE course_id = ?1",
                id,
            )?;
            tx.execute("DELETE FROM courses WHERE id = ?1", [id])?;
            tx.commit()?;
            info!("Deleted course '{}' (id {})", course.name, id);
            Ok((course, assets))
        })
    }

    // -- Statistics --

    /// Total chapter views per course, busiest first.
    pub fn course_access_stats(&self) -> Result<Vec<CourseAccessStat>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT co.id, co.name, COALESCE(SUM(ch.access_sum), 0) AS total
                 FROM courses co
                 LEFT JOIN chapters ch ON ch.course_id = co.id
                 GROUP BY co.id, co.name
                 ORDER BY total DESC, co.id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CourseAccessStat {
                        course_id: row.get(0)?,
                        course_name: row.get(1)?,
                        access_total: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_category(conn: &Connection, id: i64) -> Result<Option<Category>> {
    let row = conn
        .query_row("SELECT id, name FROM categories WHERE id = ?1", [id], category_from_row)
        .optional()?;
    Ok(row)
}

pub(crate) fn query_course(conn: &Connection, id: i64) -> Result<Option<Course>> {
    let row = conn
        .query_row(
            &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"),
            [id],
            course_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Runs a `(video_filename, outline_filename)` query and flattens the
/// non-null names.
pub(crate) fn collect_assets(conn: &Connection, sql: &str, id: i64) -> Result<Vec<StoredAsset>> {
    let mut stmt = conn.prepare(sql)?;
    let pairs = stmt
        .query_map([id], |row| {
            Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut assets = Vec::new();
    for (video, outline) in pairs {
        if let Some(filename) = video {
            assets.push(StoredAsset { kind: AssetKind::Video, filename });
        }
        if let Some(filename) = outline {
            assets.push(StoredAsset { kind: AssetKind::Outline, filename });
        }
    }
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::open_temp;
    use crate::users::NewUser;

    fn course_in(db: &Database, category_id: i64, name: &str) -> Course {
        db.create_course(&NewCourse {
            name,
            category_id,
            teacher_name: "Ms. Li",
            about_course: "",
        })
        .unwrap()
        .0
    }

    #[test]
    fn category_names_are_unique() {
        let (_dir, db) = open_temp();
        let art = db.create_category("Art").unwrap();
        assert!(matches!(
            db.create_category("Art"),
            Err(StoreError::Conflict { field: "name" })
        ));
        assert!(matches!(
            db.rename_category(art.id, "Music"),
            Err(StoreError::Conflict { field: "name" })
        ));
        assert_eq!(db.rename_category(art.id, "Fine Art").unwrap().name, "Fine Art");
        assert!(matches!(db.rename_category(999, "X"), Err(StoreError::NotFound("category"))));
    }

    #[test]
    fn new_course_gets_first_chapter() {
        let (_dir, db) = open_temp();
        let cat = db.create_category("Art").unwrap();
        let (course, chapter) = db
            .create_course(&NewCourse {
                name: "Drawing",
                category_id: cat.id,
                teacher_name: "",
                about_course: "",
            })
            .unwrap();

        assert_eq!(chapter.index, 1);
        assert_eq!(chapter.name, FIRST_CHAPTER_NAME);
        let chapters = db.list_chapters(course.id).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].id, chapter.id);
    }

    #[test]
    fn course_needs_existing_category() {
        let (_dir, db) = open_temp();
        let res = db.create_course(&NewCourse {
            name: "Orphan",
            category_id: 999,
            teacher_name: "",
            about_course: "",
        });
        assert!(matches!(res, Err(StoreError::NotFound("category"))));
    }

    #[test]
    fn deleting_category_cascades() {
        let (_dir, db) = open_temp();
        let cat = db.create_category("Art").unwrap();
        let other = db.create_category("Cooking").unwrap();
        let doomed = course_in(&db, cat.id, "Drawing");
        let kept = course_in(&db, other.id, "Baking");

        let ch2 = db.insert_chapter_after(doomed.id, 1, "Shading", "").unwrap();
        db.set_chapter_asset(ch2.id, AssetKind::Video, "Drawing_2_Shading.mp4").unwrap();

        let author = db
            .create_user(
                &NewUser {
                    email: "a@example.com",
                    username: "a",
                    password_hash: "h",
                },
                None,
            )
            .unwrap();
        let comment = db.create_comment(author.id, ch2.id, "nice").unwrap();

        let assets = db.delete_category(cat.id).unwrap();
        assert_eq!(
            assets,
            vec![StoredAsset {
                kind: AssetKind::Video,
                filename: "Drawing_2_Shading.mp4".into()
            }]
        );

        assert!(db.get_category(cat.id).unwrap().is_none());
        assert!(db.get_course(doomed.id).unwrap().is_none());
        assert!(db.list_chapters(doomed.id).unwrap().is_empty());
        assert!(db.get_chapter(ch2.id).unwrap().is_none());
        assert!(db.get_comment(comment.id).unwrap().is_none());

        assert!(db.get_course(kept.id).unwrap().is_some());
        assert_eq!(db.list_chapters(kept.id).unwrap().len(), 1);
    }

    #[test]
    fn course_can_move_category() {
        let (_dir, db) = open_temp();
        let a = db.create_category("Art").unwrap();
        let b = db.create_category("Cooking").unwrap();
        let course = course_in(&db, a.id, "Plating");

        let moved = db
            .update_course(
                course.id,
                &NewCourse {
                    name: "Plating",
                    category_id: b.id,
                    teacher_name: "Chef",
                    about_course: "food as art",
                },
            )
            .unwrap();
        assert_eq!(moved.category_id, b.id);
        assert!(db.list_courses(a.id).unwrap().is_empty());
        assert_eq!(db.list_courses(b.id).unwrap().len(), 1);
    }

    #[test]
    fn access_stats_sum_chapters() {
        let (_dir, db) = open_temp();
        let cat = db.create_category("Art").unwrap();
        let course = course_in(&db, cat.id, "Drawing");
        let ch2 = db.insert_chapter_after(course.id, 1, "Two", "").unwrap();
        let first = db.find_chapter_by_course_and_index(course.id, 1).unwrap().unwrap();

        db.record_chapter_access(first.id).unwrap();
        db.record_chapter_access(ch2.id).unwrap();
        db.record_chapter_access(ch2.id).unwrap();

        let stats = db.course_access_stats().unwrap();
        assert_eq!(stats[0].course_id, course.id);
        assert_eq!(stats[0].access_total, 3);
    }
}
