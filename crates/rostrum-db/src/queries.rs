use rusqlite::{Connection, OptionalExtension, params};

use rostrum_types::models::{CommentId, FederatedProvider, PostId, UserId};

use crate::models::{NewUser, USER_COLUMNS, UserRow};
use crate::{Database, DbError};

fn subject_column(provider: FederatedProvider) -> &'static str {
    match provider {
        FederatedProvider::Google => "google_id",
        FederatedProvider::Apple => "apple_id",
    }
}

impl Database {
    // -- Users --

    /// Insert a user. Username, email and provider-subject uniqueness are enforced by the
    /// schema, so a concurrent duplicate surfaces here as `DbError::Conflict`.
    pub fn insert_user(&self, user: &NewUser<'_>) -> Result<UserRow, DbError> {
        self.with_conn_mut(|conn| {
            let sql = format!(
                "INSERT INTO users (username, email, password_hash, avatar, auth_provider, google_id, apple_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 RETURNING {USER_COLUMNS}"
            );
            let row = conn.query_row(
                &sql,
                params![
                    user.username,
                    user.email,
                    user.password_hash,
                    user.avatar,
                    user.auth_provider.as_str(),
                    user.google_id,
                    user.apple_id,
                ],
                UserRow::from_row,
            )?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: UserId) -> Result<Option<UserRow>, DbError> {
        self.with_conn(|conn| query_user_where(conn, "id = ?1", params![id.0]))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>, DbError> {
        self.with_conn(|conn| query_user_where(conn, "email = ?1", params![email]))
    }

    /// Local-credential lookup: only accounts created with a password qualify.
    pub fn get_local_user_by_email(&self, email: &str) -> Result<Option<UserRow>, DbError> {
        self.with_conn(|conn| {
            query_user_where(
                conn,
                "email = ?1 AND auth_provider = 'email'",
                params![email],
            )
        })
    }

    pub fn username_exists(&self, username: &str) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                [username],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn username_or_email_exists(&self, username: &str, email: &str) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 OR email = ?2)",
                [username, email],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Find the account a federated login resolves to: a row whose email matches, or whose
    /// provider subject matches. When both exist as different rows the email match wins.
    pub fn find_federated_match(
        &self,
        provider: FederatedProvider,
        email: &str,
        subject: &str,
    ) -> Result<Option<UserRow>, DbError> {
        let column = subject_column(provider);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE (email = ?1 AND ?1 <> '') OR {column} = ?2
                 ORDER BY (email = ?1) DESC, id ASC
                 LIMIT 1"
            );
            let row = conn
                .query_row(&sql, params![email, subject], UserRow::from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Attach a provider subject to an existing account if it has none yet.
    /// Returns whether the row changed; running it twice with the same value is harmless.
    pub fn link_provider_subject(
        &self,
        id: UserId,
        provider: FederatedProvider,
        subject: &str,
    ) -> Result<bool, DbError> {
        let column = subject_column(provider);
        self.with_conn_mut(|conn| {
            let sql = format!(
                "UPDATE users SET {column} = ?1, updated_at = datetime('now')
                 WHERE id = ?2 AND ({column} IS NULL OR {column} = '')"
            );
            let changed = conn.execute(&sql, params![subject, id.0])?;
            Ok(changed > 0)
        })
    }

    /// Set the avatar only when the account has none.
    pub fn backfill_avatar(&self, id: UserId, avatar: &str) -> Result<bool, DbError> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET avatar = ?1, updated_at = datetime('now')
                 WHERE id = ?2 AND avatar = ''",
                params![avatar, id.0],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Posts & comments (vote targets) --

    pub fn insert_post(&self, author: UserId, title: &str, body: &str) -> Result<PostId, DbError> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (author_id, title, body) VALUES (?1, ?2, ?3)",
                params![author.0, title, body],
            )?;
            Ok(PostId(conn.last_insert_rowid()))
        })
    }

    pub fn insert_comment(
        &self,
        post: PostId,
        author: UserId,
        body: &str,
    ) -> Result<CommentId, DbError> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (post_id, author_id, body) VALUES (?1, ?2, ?3)",
                params![post.0, author.0, body],
            )?;
            Ok(CommentId(conn.last_insert_rowid()))
        })
    }
}

fn query_user_where(
    conn: &Connection,
    predicate: &str,
    params: impl rusqlite::Params,
) -> Result<Option<UserRow>, DbError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
    let row = conn.query_row(&sql, params, UserRow::from_row).optional()?;
    Ok(row)
}
