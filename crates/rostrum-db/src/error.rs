use rusqlite::ffi;
use thiserror::Error;

/// Which uniqueness guarantee an insert or update ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
    GoogleSubject,
    AppleSubject,
    Vote,
    Other,
}

impl UniqueField {
    /// Classify SQLite's "UNIQUE constraint failed: table.column[, table.column]" message.
    fn from_message(msg: &str) -> Self {
        let columns = msg
            .strip_prefix("UNIQUE constraint failed: ")
            .unwrap_or(msg);

        match columns {
            "users.username" => Self::Username,
            "users.email" => Self::Email,
            "users.google_id" => Self::GoogleSubject,
            "users.apple_id" => Self::AppleSubject,
            c if c.starts_with("votes.") => Self::Vote,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("unique constraint violated on {0:?}")]
    Conflict(UniqueField),

    #[error("database lock poisoned")]
    Poisoned,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, msg) = &err {
            if code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE {
                let field = msg
                    .as_deref()
                    .map(UniqueField::from_message)
                    .unwrap_or(UniqueField::Other);
                return Self::Conflict(field);
            }
        }
        Self::Sqlite(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_unique_messages() {
        let cases = [
            ("UNIQUE constraint failed: users.username", UniqueField::Username),
            ("UNIQUE constraint failed: users.email", UniqueField::Email),
            ("UNIQUE constraint failed: users.google_id", UniqueField::GoogleSubject),
            ("UNIQUE constraint failed: users.apple_id", UniqueField::AppleSubject),
            ("UNIQUE constraint failed: votes.user_id, votes.post_id", UniqueField::Vote),
            ("UNIQUE constraint failed: posts.id", UniqueField::Other),
        ];
        for (msg, expected) in cases {
            assert_eq!(UniqueField::from_message(msg), expected, "{msg}");
        }
    }
}
