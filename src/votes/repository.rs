// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::RepositoryError;
use crate::state::DbPool;
use crate::votes::domain::*;

#[async_trait]
pub trait VoteRepository: Send + Sync {
    /// Apply up/down/remove for (voter, quote) and report the new tally.
    async fn apply(
        &self,
        voter: i64,
        quote_id: i64,
        action: VoteAction,
    ) -> Result<VoteOutcome, RepositoryError>;

    async fn tally(&self, quote_id: i64) -> Result<VoteTally, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteVoteRepository {
    pool: DbPool,
}

impl SqliteVoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Set the voter's direction on a quote, creating the row if needed.
/// Also used inside the quote-creation transaction for the author's upvote.
pub fn set_vote(conn: &Connection, voter: i64, quote_id: i64, up: bool) -> Result<(), RepositoryError> {
    conn.execute(
        "INSERT INTO quote_votes (user_id, quote_id, vote) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id, quote_id) DO UPDATE SET vote = excluded.vote",
        params![voter, quote_id, up],
    )?;
    Ok(())
}

pub fn load_tally(conn: &Connection, quote_id: i64) -> Result<VoteTally, RepositoryError> {
    let tally = conn.query_row(
        "SELECT COALESCE(SUM(vote = 1), 0), COALESCE(SUM(vote = 0), 0)
         FROM quote_votes WHERE quote_id = ?1",
        params![quote_id],
        |row| {
            Ok(VoteTally {
                up: row.get(0)?,
                down: row.get(1)?,
            })
        },
    )?;
    Ok(tally)
}

#[async_trait]
impl VoteRepository for SqliteVoteRepository {
    async fn apply(
        &self,
        voter: i64,
        quote_id: i64,
        action: VoteAction,
    ) -> Result<VoteOutcome, RepositoryError> {
        let conn = self.pool.get()?;

        conn.query_row("SELECT id FROM quotes WHERE id = ?1", params![quote_id], |_| Ok(()))
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("quote {}", quote_id)))?;

        match action.direction() {
            Some(up) => set_vote(&conn, voter, quote_id, up)?,
            None => {
                let removed = conn.execute(
                    "DELETE FROM quote_votes WHERE user_id = ?1 AND quote_id = ?2",
                    params![voter, quote_id],
                )?;
                if removed == 0 {
                    return Err(RepositoryError::NotFound(format!(
                        "vote by user {} on quote {}",
                        voter, quote_id
                    )));
                }
            }
        }

        let tally = load_tally(&conn, quote_id)?;
        tracing::debug!(voter, quote_id, action = %action, sum = tally.sum(), "vote applied");
        Ok(VoteOutcome::new(quote_id, action, tally))
    }

    async fn tally(&self, quote_id: i64) -> Result<VoteTally, RepositoryError> {
        let conn = self.pool.get()?;
        load_tally(&conn, quote_id)
    }
}
