use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use efc_types::permissions::ROLE_CATALOG;

use crate::Result;

/// Categories created with a fresh database. Deleting one later sticks.
const DEFAULT_CATEGORIES: [&str; 3] = ["Programming", "Music", "Handicraft"];

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE roles (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                permissions INTEGER NOT NULL DEFAULT 0,
                is_default  INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_roles_default ON roles(is_default);

            CREATE TABLE users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                email         TEXT NOT NULL UNIQUE,
                username      TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role_id       INTEGER NOT NULL REFERENCES roles(id),
                confirmed     INTEGER NOT NULL DEFAULT 0,
                can_comment   INTEGER NOT NULL DEFAULT 1,
                temp_email    TEXT,
                name          TEXT,
                location      TEXT,
                about_me      TEXT,
                member_since  TEXT NOT NULL DEFAULT (datetime('now')),
                last_seen     TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE categories (
                id    INTEGER PRIMARY KEY AUTOINCREMENT,
                name  TEXT NOT NULL UNIQUE
            );

            CREATE TABLE courses (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                name          TEXT NOT NULL,
                category_id   INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                teacher_name  TEXT NOT NULL DEFAULT '',
                about_course  TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX idx_courses_category ON courses(category_id);

            CREATE TABLE chapters (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id         INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                idx               INTEGER NOT NULL,
                name              TEXT NOT NULL,
                about_chapter     TEXT NOT NULL DEFAULT '',
                video_filename    TEXT,
                outline_filename  TEXT,
                access_sum        INTEGER NOT NULL DEFAULT 0,
                UNIQUE(course_id, idx)
            );

            CREATE TABLE comments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                body        TEXT NOT NULL,
                body_html   TEXT NOT NULL,
                timestamp   TEXT NOT NULL DEFAULT (datetime('now')),
                author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                chapter_id  INTEGER NOT NULL REFERENCES chapters(id) ON DELETE CASCADE,
                enabled     INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_comments_chapter ON comments(chapter_id, timestamp);
            CREATE INDEX idx_comments_pending ON comments(enabled, timestamp);
            CREATE INDEX idx_comments_author ON comments(author_id, timestamp);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;

        for name in DEFAULT_CATEGORIES {
            conn.execute("INSERT OR IGNORE INTO categories (name) VALUES (?1)", [name])?;
        }
    }

    seed_roles(conn)?;

    info!("Database migrations complete");
    Ok(())
}

/// Recreates any missing catalog role. Existing roles keep whatever an
/// administrator has changed, and a catalog default is only honoured while no
/// other role is the default.
fn seed_roles(conn: &Connection) -> Result<()> {
    for seed in ROLE_CATALOG {
        let has_default = conn
            .query_row("SELECT id FROM roles WHERE is_default = 1 LIMIT 1", [], |r| r.get::<_, i64>(0))
            .optional()?
            .is_some();

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO roles (name, permissions, is_default) VALUES (?1, ?2, ?3)",
            rusqlite::params![seed.name, seed.permissions.to_stored(), seed.is_default && !has_default],
        )?;
        if inserted > 0 {
            info!("Seeded role '{}'", seed.name);
        }
    }
    Ok(())
}
