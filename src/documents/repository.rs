use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::format_timestamp;
use crate::db::models::{display_name, Document, DocumentCategory};
use crate::documents::domain::{is_valid_category_name, DocumentType};
use crate::error::RepositoryError;
use crate::ratings::domain::RatingSummary;

/// A category with its document counts per type group.
#[derive(Debug, Clone)]
pub struct CategoryListing {
    pub category: DocumentCategory,
    pub summary: i64,
    pub exam: i64,
    pub other: i64,
}

impl CategoryListing {
    pub fn total(&self) -> i64 {
        self.summary + self.exam + self.other
    }
}

/// Categories by name, those with documents before the empty ones.
pub fn list_categories(conn: &Connection) -> Result<Vec<CategoryListing>, RepositoryError> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.description,
                COALESCE(SUM(d.dtype = ?1), 0),
                COALESCE(SUM(d.dtype = ?2), 0),
                COALESCE(SUM(d.dtype NOT IN (?1, ?2)), 0)
         FROM document_categories c
         LEFT JOIN documents d ON d.category_id = c.id
         GROUP BY c.id
         ORDER BY c.name COLLATE NOCASE",
    )?;
    let listings: Vec<CategoryListing> = stmt
        .query_map(
            params![DocumentType::Summary.id(), DocumentType::Exam.id()],
            |row| {
                Ok(CategoryListing {
                    category: DocumentCategory::from_row(row)?,
                    summary: row.get(3)?,
                    exam: row.get(4)?,
                    other: row.get(5)?,
                })
            },
        )?
        .collect::<Result<_, _>>()?;

    let (nonempty, empty): (Vec<_>, Vec<_>) = listings.into_iter().partition(|c| c.total() > 0);
    Ok(nonempty.into_iter().chain(empty).collect())
}

/// Case-insensitive lookup by the category name used in URLs.
pub fn category_by_name(conn: &Connection, name: &str) -> Result<DocumentCategory, RepositoryError> {
    let sql = format!(
        "SELECT {} FROM document_categories WHERE name = ?1 COLLATE NOCASE",
        DocumentCategory::COLUMNS
    );
    conn.query_row(&sql, params![name], DocumentCategory::from_row)
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("category {}", name)))
}

pub fn category_by_id(conn: &Connection, id: i64) -> Result<DocumentCategory, RepositoryError> {
    let sql = format!(
        "SELECT {} FROM document_categories WHERE id = ?1",
        DocumentCategory::COLUMNS
    );
    conn.query_row(&sql, params![id], DocumentCategory::from_row)
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("category {}", id)))
}

pub fn create_category(
    conn: &Connection,
    name: &str,
    description: &str,
) -> Result<DocumentCategory, RepositoryError> {
    let name = name.trim();
    if !is_valid_category_name(name) {
        return Err(RepositoryError::Validation(
            "Kürzel darf nur Buchstaben, Zahlen, '-' und '_' enthalten (max. 32 Zeichen).".into(),
        ));
    }
    if description.trim().is_empty() {
        return Err(RepositoryError::Validation("Voller Name fehlt.".into()));
    }
    conn.execute(
        "INSERT INTO document_categories (name, description) VALUES (?1, ?2)",
        params![name, description.trim()],
    )?;
    category_by_id(conn, conn.last_insert_rowid())
}

/// A document with everything the listings and the API show next to it.
#[derive(Debug, Clone)]
pub struct DocumentView {
    pub document: Document,
    pub category_name: String,
    pub uploader_name: Option<String>,
    pub rating: RatingSummary,
    pub download_count: i64,
}

const VIEW_SELECT: &str = "
    SELECT d.id, d.name, d.description, d.url, d.category_id, d.dtype,
           d.file_path, d.original_filename, d.uploader_id, d.upload_date,
           d.change_date, d.license, d.public,
           c.name, u.username, u.first_name, u.last_name,
           (SELECT COUNT(*) FROM document_ratings r WHERE r.document_id = d.id),
           (SELECT COALESCE(SUM(r.rating), 0) FROM document_ratings r WHERE r.document_id = d.id),
           (SELECT COUNT(*) FROM document_downloads dl WHERE dl.document_id = d.id)
    FROM documents d
    JOIN document_categories c ON c.id = d.category_id
    LEFT JOIN users u ON u.id = d.uploader_id";

fn view_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentView> {
    let username: Option<String> = row.get(14)?;
    let first: Option<String> = row.get(15)?;
    let last: Option<String> = row.get(16)?;
    Ok(DocumentView {
        document: Document::from_row(row)?,
        category_name: row.get(13)?,
        uploader_name: username.map(|u| {
            display_name(&u, first.as_deref().unwrap_or(""), last.as_deref().unwrap_or(""))
        }),
        rating: RatingSummary::from_totals(None, row.get(17)?, row.get(18)?),
        download_count: row.get(19)?,
    })
}

fn query_views(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<DocumentView>, RepositoryError> {
    let sql = format!(
        "{} {} ORDER BY d.change_date DESC, d.id DESC",
        VIEW_SELECT, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_in_category(conn: &Connection, category_id: i64) -> Result<Vec<DocumentView>, RepositoryError> {
    query_views(conn, "WHERE d.category_id = ?1", params![category_id])
}

pub fn list_by_uploader(conn: &Connection, user_id: i64) -> Result<Vec<DocumentView>, RepositoryError> {
    query_views(conn, "WHERE d.uploader_id = ?1", params![user_id])
}

pub fn list_all(conn: &Connection) -> Result<Vec<DocumentView>, RepositoryError> {
    query_views(conn, "", params![])
}

pub fn view(conn: &Connection, id: i64) -> Result<DocumentView, RepositoryError> {
    query_views(conn, "WHERE d.id = ?1", params![id])?
        .into_iter()
        .next()
        .ok_or_else(|| RepositoryError::NotFound(format!("document {}", id)))
}

pub fn get(conn: &Connection, id: i64) -> Result<Document, RepositoryError> {
    let sql = format!("SELECT {} FROM documents WHERE id = ?1", Document::COLUMNS);
    conn.query_row(&sql, params![id], Document::from_row)
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("document {}", id)))
}

/// Metadata shared by upload and edit forms.
#[derive(Debug, Clone)]
pub struct DocumentFields {
    pub name: String,
    pub description: String,
    pub url: Option<String>,
    pub dtype: i64,
    pub license: Option<i64>,
    pub public: bool,
}

/// A file that has already been written below the upload root.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: String,
    pub original_filename: String,
}

pub fn create(
    conn: &Connection,
    uploader: i64,
    category_id: i64,
    fields: &DocumentFields,
    file: &StoredFile,
    at: DateTime<Utc>,
) -> Result<Document, RepositoryError> {
    let now = format_timestamp(&at);
    conn.execute(
        "INSERT INTO documents (name, description, url, category_id, dtype, file_path,
                                original_filename, uploader_id, upload_date, change_date,
                                license, public)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10, ?11)",
        params![
            fields.name.trim(),
            fields.description.trim(),
            fields.url,
            category_id,
            fields.dtype,
            file.path,
            file.original_filename,
            uploader,
            now,
            fields.license,
            fields.public,
        ],
    )?;
    get(conn, conn.last_insert_rowid())
}

/// Update metadata; `change_date` only moves when a new file replaces the old one.
/// Returns the updated document and, if replaced, the previous file path.
pub fn update(
    conn: &Connection,
    id: i64,
    category_id: i64,
    fields: &DocumentFields,
    file: Option<&StoredFile>,
    at: DateTime<Utc>,
) -> Result<(Document, Option<String>), RepositoryError> {
    let previous = get(conn, id)?;
    conn.execute(
        "UPDATE documents SET name = ?2, description = ?3, url = ?4, category_id = ?5,
                dtype = ?6, license = ?7, public = ?8
         WHERE id = ?1",
        params![
            id,
            fields.name.trim(),
            fields.description.trim(),
            fields.url,
            category_id,
            fields.dtype,
            fields.license,
            fields.public,
        ],
    )?;

    let replaced = match file {
        Some(file) => {
            conn.execute(
                "UPDATE documents SET file_path = ?2, original_filename = ?3, change_date = ?4
                 WHERE id = ?1",
                params![id, file.path, file.original_filename, format_timestamp(&at)],
            )?;
            Some(previous.file_path)
        }
        None => None,
    };
    Ok((get(conn, id)?, replaced))
}

/// Delete the row and return its stored file path.
pub fn delete(conn: &Connection, id: i64) -> Result<String, RepositoryError> {
    let doc = get(conn, id)?;
    conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
    Ok(doc.file_path)
}
