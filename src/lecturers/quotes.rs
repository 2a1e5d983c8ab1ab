use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;

use crate::db::models::{display_name, Quote};
use crate::error::RepositoryError;
use crate::votes::repository::set_vote;

pub const QUOTES_PER_PAGE: i64 = 50;

/// A quote joined with lecturer, author and the viewer's vote state.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteView {
    pub id: i64,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub lecturer_id: i64,
    pub lecturer_name: String,
    pub date: String,
    pub quote: String,
    pub comment: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub voted_up: bool,
    pub voted_down: bool,
    /// Whether the viewer wrote the quote.
    pub mine: bool,
}

impl QuoteView {
    pub fn vote_count(&self) -> i64 {
        self.upvotes + self.downvotes
    }

    pub fn vote_sum(&self) -> i64 {
        self.upvotes - self.downvotes
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let username: Option<String> = row.get(9)?;
        let author_first: Option<String> = row.get(10)?;
        let author_last: Option<String> = row.get(11)?;
        let author_name = username.map(|u| {
            display_name(
                &u,
                author_first.as_deref().unwrap_or(""),
                author_last.as_deref().unwrap_or(""),
            )
        });
        let title: Option<String> = row.get(6)?;
        let last: String = row.get(7)?;
        let first: String = row.get(8)?;
        let lecturer_name = [title.unwrap_or_default(), last, first]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let own_vote: Option<bool> = row.get(14)?;
        Ok(Self {
            id: row.get(0)?,
            author_id: row.get(1)?,
            author_name,
            lecturer_id: row.get(2)?,
            lecturer_name,
            date: row.get(3)?,
            quote: row.get(4)?,
            comment: row.get(5)?,
            upvotes: row.get(12)?,
            downvotes: row.get(13)?,
            voted_up: own_vote == Some(true),
            voted_down: own_vote == Some(false),
            mine: row.get(15)?,
        })
    }
}

const VIEW_SELECT: &str = "
    SELECT q.id, q.author_id, q.lecturer_id, q.date, q.quote, q.comment,
           l.title, l.last_name, l.first_name,
           u.username, u.first_name, u.last_name,
           (SELECT COUNT(*) FROM quote_votes v WHERE v.quote_id = q.id AND v.vote = 1),
           (SELECT COUNT(*) FROM quote_votes v WHERE v.quote_id = q.id AND v.vote = 0),
           (SELECT v.vote FROM quote_votes v WHERE v.quote_id = q.id AND v.user_id = ?1),
           COALESCE(q.author_id = ?1, 0)
    FROM quotes q
    JOIN lecturers l ON l.id = q.lecturer_id
    LEFT JOIN users u ON u.id = q.author_id";

/// One page of a listing, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub total_items: i64,
    pub per_page: i64,
}

impl Page {
    pub fn new(requested: Option<i64>, total_items: i64, per_page: i64) -> Self {
        let last = ((total_items + per_page - 1) / per_page).max(1);
        Self {
            number: requested.unwrap_or(1).clamp(1, last),
            total_items,
            per_page,
        }
    }

    pub fn page_count(&self) -> i64 {
        ((self.total_items + self.per_page - 1) / self.per_page).max(1)
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.per_page
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.page_count()
    }
}

pub fn count(conn: &Connection) -> Result<i64, RepositoryError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM quotes", [], |r| r.get(0))?)
}

/// Newest first. `viewer` only decides the voted_up/voted_down flags.
pub fn list_page(conn: &Connection, viewer: Option<i64>, page: &Page) -> Result<Vec<QuoteView>, RepositoryError> {
    let sql = format!("{} ORDER BY q.date DESC, q.id DESC LIMIT ?2 OFFSET ?3", VIEW_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![viewer, page.per_page, page.offset()], QuoteView::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_for_lecturer(
    conn: &Connection,
    viewer: Option<i64>,
    lecturer_id: i64,
) -> Result<Vec<QuoteView>, RepositoryError> {
    let sql = format!("{} WHERE q.lecturer_id = ?2 ORDER BY q.date DESC, q.id DESC", VIEW_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![viewer, lecturer_id], QuoteView::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Quote>, RepositoryError> {
    let sql = format!("SELECT {} FROM quotes ORDER BY date DESC, id DESC", Quote::COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], Quote::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, id: i64) -> Result<Quote, RepositoryError> {
    let sql = format!("SELECT {} FROM quotes WHERE id = ?1", Quote::COLUMNS);
    conn.query_row(&sql, params![id], Quote::from_row)
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("quote {}", id)))
}

fn validate_text(quote: &str) -> Result<(), RepositoryError> {
    if quote.trim().is_empty() {
        return Err(RepositoryError::Validation("Zitat darf nicht leer sein.".into()));
    }
    Ok(())
}

/// Insert a quote and its author's upvote atomically.
pub fn create(
    conn: &mut Connection,
    author: i64,
    lecturer_id: i64,
    quote: &str,
    comment: &str,
) -> Result<Quote, RepositoryError> {
    validate_text(quote)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let lecturer_exists = tx
        .query_row("SELECT 1 FROM lecturers WHERE id = ?1", params![lecturer_id], |_| Ok(()))
        .optional()?
        .is_some();
    if !lecturer_exists {
        return Err(RepositoryError::Validation(format!(
            "Unbekannter Dozent {}",
            lecturer_id
        )));
    }

    tx.execute(
        "INSERT INTO quotes (author_id, lecturer_id, quote, comment) VALUES (?1, ?2, ?3, ?4)",
        params![author, lecturer_id, quote.trim(), comment.trim()],
    )?;
    let id = tx.last_insert_rowid();
    set_vote(&tx, author, id, true)?;
    tx.commit()?;

    tracing::info!(quote_id = id, author, lecturer_id, "quote created");
    get(conn, id)
}

/// Edit text fields; author and votes stay untouched.
pub fn update(
    conn: &Connection,
    id: i64,
    lecturer_id: i64,
    quote: &str,
    comment: &str,
) -> Result<Quote, RepositoryError> {
    validate_text(quote)?;
    let changed = conn
        .execute(
            "UPDATE quotes SET lecturer_id = ?2, quote = ?3, comment = ?4 WHERE id = ?1",
            params![id, lecturer_id, quote.trim(), comment.trim()],
        )
        .map_err(|e| match RepositoryError::from(e) {
            RepositoryError::Conflict(_) => {
                RepositoryError::Validation(format!("Unbekannter Dozent {}", lecturer_id))
            }
            other => other,
        })?;
    if changed == 0 {
        return Err(RepositoryError::NotFound(format!("quote {}", id)));
    }
    get(conn, id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<(), RepositoryError> {
    let removed = conn.execute("DELETE FROM quotes WHERE id = ?1", params![id])?;
    if removed == 0 {
        return Err(RepositoryError::NotFound(format!("quote {}", id)));
    }
    Ok(())
}
