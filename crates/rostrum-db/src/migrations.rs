use rusqlite::Connection;
use tracing::info;

use crate::DbError;

pub fn run(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, posts, comments, votes)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL DEFAULT '',
                bio             TEXT NOT NULL DEFAULT '',
                avatar          TEXT NOT NULL DEFAULT '',
                auth_provider   TEXT NOT NULL DEFAULT 'email'
                                CHECK (auth_provider IN ('email', 'google', 'apple')),
                google_id       TEXT,
                apple_id        TEXT,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE UNIQUE INDEX idx_users_google_id ON users(google_id)
                WHERE google_id IS NOT NULL;
            CREATE UNIQUE INDEX idx_users_apple_id ON users(apple_id)
                WHERE apple_id IS NOT NULL;

            CREATE TABLE posts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                author_id   INTEGER NOT NULL REFERENCES users(id),
                title       TEXT NOT NULL,
                body        TEXT NOT NULL DEFAULT '',
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE comments (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id             INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                author_id           INTEGER NOT NULL REFERENCES users(id),
                parent_comment_id   INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                body                TEXT NOT NULL,
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_comments_post ON comments(post_id);

            -- Exactly one of post_id / comment_id is set on every row.
            CREATE TABLE votes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                post_id     INTEGER REFERENCES posts(id) ON DELETE CASCADE,
                comment_id  INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                vote_type   INTEGER NOT NULL CHECK (vote_type IN (1, -1)),
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK ((post_id IS NULL) <> (comment_id IS NULL))
            );

            CREATE UNIQUE INDEX idx_votes_user_post ON votes(user_id, post_id)
                WHERE post_id IS NOT NULL;
            CREATE UNIQUE INDEX idx_votes_user_comment ON votes(user_id, comment_id)
                WHERE comment_id IS NOT NULL;
            CREATE INDEX idx_votes_post ON votes(post_id, vote_type)
                WHERE post_id IS NOT NULL;
            CREATE INDEX idx_votes_comment ON votes(comment_id, vote_type)
                WHERE comment_id IS NOT NULL;

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
