use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use crate::db::models::Lecturer;
use crate::error::RepositoryError;

/// Staff who show up in the directory but don't teach.
const EXCLUDED_FUNCTIONS: [&str; 2] = ["Projektmitarbeiter", "Projektmitarbeiterin"];
const EXCLUDED_DEPARTMENTS: [&str; 1] = ["Gebäudemanagement"];

#[derive(Debug, Clone)]
pub struct LecturerListing {
    pub lecturer: Lecturer,
    pub quote_count: i64,
}

/// Lecturers that actually teach, by last name, with their quote counts.
pub fn list_real(conn: &Connection) -> Result<Vec<LecturerListing>, RepositoryError> {
    let sql = format!(
        "SELECT {}, (SELECT COUNT(*) FROM quotes q WHERE q.lecturer_id = lecturers.id)
         FROM lecturers
         WHERE COALESCE(function, '') NOT IN (?1, ?2)
           AND COALESCE(department, '') NOT IN (?3)
         ORDER BY last_name, first_name",
        Lecturer::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![
                EXCLUDED_FUNCTIONS[0],
                EXCLUDED_FUNCTIONS[1],
                EXCLUDED_DEPARTMENTS[0]
            ],
            |row| {
                Ok(LecturerListing {
                    lecturer: Lecturer::from_row(row)?,
                    quote_count: row.get(11)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every lecturer, for the API and the quote form.
pub fn list_all(conn: &Connection) -> Result<Vec<Lecturer>, RepositoryError> {
    let sql = format!(
        "SELECT {} FROM lecturers ORDER BY last_name, first_name",
        Lecturer::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], Lecturer::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, id: i64) -> Result<Lecturer, RepositoryError> {
    let sql = format!("SELECT {} FROM lecturers WHERE id = ?1", Lecturer::COLUMNS);
    conn.query_row(&sql, params![id], Lecturer::from_row)
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("lecturer {}", id)))
}

/// Whether a lecturer belongs in the public directory.
pub fn is_real(lecturer: &Lecturer) -> bool {
    let function = lecturer.function.as_deref().unwrap_or("");
    let department = lecturer.department.as_deref().unwrap_or("");
    !EXCLUDED_FUNCTIONS.contains(&function) && !EXCLUDED_DEPARTMENTS.contains(&department)
}

/// Like `get`, but staff outside the directory are not found.
pub fn get_real(conn: &Connection, id: i64) -> Result<Lecturer, RepositoryError> {
    let lecturer = get(conn, id)?;
    if !is_real(&lecturer) {
        return Err(RepositoryError::NotFound(format!("lecturer {}", id)));
    }
    Ok(lecturer)
}

pub fn quote_ids(conn: &Connection, lecturer_id: i64) -> Result<Vec<i64>, RepositoryError> {
    let mut stmt = conn.prepare("SELECT id FROM quotes WHERE lecturer_id = ?1 ORDER BY id")?;
    let ids = stmt
        .query_map(params![lecturer_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Number of distinct lecturers a user has rated in any category.
pub fn rated_count(conn: &Connection, user_id: i64) -> Result<i64, RepositoryError> {
    let count = conn.query_row(
        "SELECT COUNT(DISTINCT lecturer_id) FROM lecturer_ratings WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// One entry of a lecturer import file.
#[derive(Debug, Clone, Deserialize)]
pub struct LecturerRecord {
    pub abbreviation: String,
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub main_area: Option<String>,
    #[serde(default)]
    pub subjects: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub office: Option<String>,
}

/// Upsert lecturers keyed by abbreviation in one transaction; returns the number of records applied.
pub fn import(conn: &mut Connection, records: &[LecturerRecord]) -> Result<usize, RepositoryError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO lecturers (abbreviation, last_name, first_name, title, department,
                                    function, main_area, subjects, email, office)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(abbreviation) DO UPDATE SET
               last_name = excluded.last_name,
               first_name = excluded.first_name,
               title = excluded.title,
               department = excluded.department,
               function = excluded.function,
               main_area = excluded.main_area,
               subjects = excluded.subjects,
               email = excluded.email,
               office = excluded.office",
        )?;
        for r in records {
            if r.abbreviation.trim().is_empty() {
                return Err(RepositoryError::Validation(format!(
                    "lecturer '{} {}' has no abbreviation",
                    r.first_name, r.last_name
                )));
            }
            stmt.execute(params![
                r.abbreviation.trim(),
                r.last_name,
                r.first_name,
                r.title,
                r.department,
                r.function,
                r.main_area,
                r.subjects,
                r.email,
                r.office,
            ])?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}
