//! The vote ledger: one row per (voter, target), toggled or switched by each cast.
//!
//! Every cast runs as a single IMMEDIATE transaction on the writer connection, so the
//! read of the standing vote and the write that follows cannot interleave with another
//! cast. The partial unique indexes on `votes` back this up: if a row appears between
//! our read and our insert anyway (another process on the same file), the insert fails
//! with a unique violation and the whole cast is replayed from a fresh read.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use thiserror::Error;
use tracing::debug;

use rostrum_types::models::{
    LedgerChange, UserId, VoteDirection, VoteOutcome, VoteTally, VoteTarget, transition,
};

use crate::models::VoteRow;
use crate::{Database, DbError, UniqueField};

/// Casts replayed after a unique violation before giving up.
pub const MAX_VOTE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0} not found")]
    TargetNotFound(VoteTarget),

    #[error("user not found")]
    VoterNotFound(UserId),

    #[error("vote on {0} kept colliding with concurrent writers")]
    Contention(VoteTarget),

    #[error(transparent)]
    Db(#[from] DbError),
}

fn target_column(target: VoteTarget) -> &'static str {
    match target {
        VoteTarget::Post(_) => "post_id",
        VoteTarget::Comment(_) => "comment_id",
    }
}

impl Database {
    /// Apply the toggle/switch transition for `voter` on `target`.
    pub fn cast_vote(
        &self,
        voter: UserId,
        target: VoteTarget,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, LedgerError> {
        for attempt in 1..=MAX_VOTE_ATTEMPTS {
            match self.with_conn_mut(|conn| cast_once(conn, voter, target, direction)) {
                Ok(Cast::Applied(outcome)) => return Ok(outcome),
                Ok(Cast::MissingTarget) => return Err(LedgerError::TargetNotFound(target)),
                Ok(Cast::MissingVoter) => return Err(LedgerError::VoterNotFound(voter)),
                Err(DbError::Conflict(UniqueField::Vote)) => {
                    debug!(
                        "Vote by user {} on {} collided (attempt {}/{}), replaying",
                        voter, target, attempt, MAX_VOTE_ATTEMPTS
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::Contention(target))
    }

    /// Upvote and downvote counts, derived from the ledger rows on every call.
    pub fn tally(&self, target: VoteTarget) -> Result<VoteTally, LedgerError> {
        let tally = self.with_conn(|conn| {
            if !target_exists(conn, target)? {
                return Ok(None);
            }
            let sql = format!(
                "SELECT COALESCE(SUM(vote_type = 1), 0), COALESCE(SUM(vote_type = -1), 0)
                 FROM votes WHERE {} = ?1",
                target_column(target)
            );
            let (up, down): (i64, i64) =
                conn.query_row(&sql, [target.id()], |row| Ok((row.get(0)?, row.get(1)?)))?;
            Ok(Some(VoteTally {
                upvotes: up as u64,
                downvotes: down as u64,
            }))
        })?;
        tally.ok_or(LedgerError::TargetNotFound(target))
    }

    /// Every ledger row for a target, oldest first.
    pub fn votes_for(&self, target: VoteTarget) -> Result<Vec<VoteRow>, DbError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, user_id, vote_type FROM votes WHERE {} = ?1 ORDER BY id",
                target_column(target)
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([target.id()], |row| {
                    Ok(VoteRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        vote_type: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

enum Cast {
    Applied(VoteOutcome),
    MissingTarget,
    MissingVoter,
}

/// One attempt at a cast.
fn cast_once(
    conn: &mut Connection,
    voter: UserId,
    target: VoteTarget,
    direction: VoteDirection,
) -> Result<Cast, DbError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if !target_exists(&tx, target)? {
        return Ok(Cast::MissingTarget);
    }
    // A session can outlive its account.
    if !voter_exists(&tx, voter)? {
        return Ok(Cast::MissingVoter);
    }

    let column = target_column(target);
    let existing: Option<(i64, i64)> = tx
        .query_row(
            &format!("SELECT id, vote_type FROM votes WHERE user_id = ?1 AND {column} = ?2"),
            params![voter.0, target.id()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let current = match existing {
        Some((id, raw)) => {
            let dir = VoteDirection::try_from(raw)
                .map_err(|e| DbError::Corrupt(format!("vote {id}: {e}")))?;
            Some((id, dir))
        }
        None => None,
    };

    let (_, change, outcome) = transition(current.map(|(_, dir)| dir), direction);

    match (change, current) {
        (LedgerChange::Insert(dir), _) => {
            tx.execute(
                &format!("INSERT INTO votes (user_id, {column}, vote_type) VALUES (?1, ?2, ?3)"),
                params![voter.0, target.id(), dir.as_i64()],
            )?;
        }
        (LedgerChange::Update(dir), Some((id, _))) => {
            tx.execute(
                "UPDATE votes SET vote_type = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![dir.as_i64(), id],
            )?;
        }
        (LedgerChange::Delete, Some((id, _))) => {
            tx.execute("DELETE FROM votes WHERE id = ?1", [id])?;
        }
        (change, None) => {
            return Err(DbError::Corrupt(format!(
                "{change:?} planned for {target} without a standing vote"
            )));
        }
    }

    tx.commit()?;
    Ok(Cast::Applied(outcome))
}

fn voter_exists(conn: &Connection, voter: UserId) -> Result<bool, DbError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [voter.0],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn target_exists(conn: &Connection, target: VoteTarget) -> Result<bool, DbError> {
    let sql = match target {
        VoteTarget::Post(_) => "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
        VoteTarget::Comment(_) => "SELECT EXISTS(SELECT 1 FROM comments WHERE id = ?1)",
    };
    let exists = conn.query_row(sql, [target.id()], |row| row.get(0))?;
    Ok(exists)
}
