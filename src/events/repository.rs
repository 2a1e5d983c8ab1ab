use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{display_name, Event};
use crate::error::RepositoryError;
use crate::events::schedule::{past_cutoff, Schedule, DATE_FORMAT};

const TIME_FORMAT: &str = "%H:%M";

/// Editable part of an event.
#[derive(Debug, Clone)]
pub struct EventFields {
    pub summary: String,
    pub description: String,
    pub schedule: Schedule,
    pub location: Option<String>,
    pub url: Option<String>,
}

impl EventFields {
    fn validate(&self) -> Result<(), RepositoryError> {
        if self.summary.trim().is_empty() {
            return Err(RepositoryError::Validation("Titel darf nicht leer sein.".into()));
        }
        if self.summary.chars().count() > 64 {
            return Err(RepositoryError::Validation(
                "Titel darf höchstens 64 Zeichen lang sein.".into(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(RepositoryError::Validation("Beschreibung fehlt.".into()));
        }
        self.schedule.validate().map_err(RepositoryError::Validation)
    }
}

#[derive(Debug, Clone)]
pub struct EventView {
    pub event: Event,
    pub author_name: Option<String>,
}

const VIEW_SELECT: &str = "
    SELECT e.id, e.author_id, e.summary, e.description, e.start_date, e.start_time,
           e.end_date, e.end_time, e.location, e.url,
           u.username, u.first_name, u.last_name
    FROM events e
    LEFT JOIN users u ON u.id = e.author_id";

fn view_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventView> {
    let username: Option<String> = row.get(10)?;
    let first: Option<String> = row.get(11)?;
    let last: Option<String> = row.get(12)?;
    Ok(EventView {
        event: Event::from_row(row)?,
        author_name: username.map(|u| {
            display_name(&u, first.as_deref().unwrap_or(""), last.as_deref().unwrap_or(""))
        }),
    })
}

fn query_views(
    conn: &Connection,
    tail: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<EventView>, RepositoryError> {
    let sql = format!("{} {}", VIEW_SELECT, tail);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Events starting today or later, soonest first.
pub fn upcoming(conn: &Connection, today: NaiveDate) -> Result<Vec<EventView>, RepositoryError> {
    query_views(
        conn,
        "WHERE e.start_date >= ?1 ORDER BY e.start_date, e.start_time",
        params![today.format(DATE_FORMAT).to_string()],
    )
}

/// Events of the last two years, most recent first.
pub fn past(conn: &Connection, today: NaiveDate) -> Result<Vec<EventView>, RepositoryError> {
    query_views(
        conn,
        "WHERE e.start_date < ?1 AND e.start_date > ?2 ORDER BY e.start_date DESC, e.start_time",
        params![
            today.format(DATE_FORMAT).to_string(),
            past_cutoff(today).format(DATE_FORMAT).to_string()
        ],
    )
}

pub fn all(conn: &Connection) -> Result<Vec<EventView>, RepositoryError> {
    query_views(conn, "ORDER BY e.start_date, e.start_time, e.id", params![])
}

pub fn view(conn: &Connection, id: i64) -> Result<EventView, RepositoryError> {
    query_views(conn, "WHERE e.id = ?1", params![id])?
        .into_iter()
        .next()
        .ok_or_else(|| RepositoryError::NotFound(format!("event {}", id)))
}

fn schedule_columns(s: &Schedule) -> (String, Option<String>, Option<String>, Option<String>) {
    (
        s.start_date.format(DATE_FORMAT).to_string(),
        s.start_time.map(|t| t.format(TIME_FORMAT).to_string()),
        s.end_date.map(|d| d.format(DATE_FORMAT).to_string()),
        s.end_time.map(|t| t.format(TIME_FORMAT).to_string()),
    )
}

pub fn create(conn: &Connection, author: i64, fields: &EventFields) -> Result<Event, RepositoryError> {
    fields.validate()?;
    let (start_date, start_time, end_date, end_time) = schedule_columns(&fields.schedule);
    conn.execute(
        "INSERT INTO events (author_id, summary, description, start_date, start_time,
                             end_date, end_time, location, url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            author,
            fields.summary.trim(),
            fields.description.trim(),
            start_date,
            start_time,
            end_date,
            end_time,
            fields.location,
            fields.url,
        ],
    )?;
    Ok(view(conn, conn.last_insert_rowid())?.event)
}

pub fn update(conn: &Connection, id: i64, fields: &EventFields) -> Result<Event, RepositoryError> {
    fields.validate()?;
    let (start_date, start_time, end_date, end_time) = schedule_columns(&fields.schedule);
    let changed = conn.execute(
        "UPDATE events SET summary = ?2, description = ?3, start_date = ?4, start_time = ?5,
                end_date = ?6, end_time = ?7, location = ?8, url = ?9
         WHERE id = ?1",
        params![
            id,
            fields.summary.trim(),
            fields.description.trim(),
            start_date,
            start_time,
            end_date,
            end_time,
            fields.location,
            fields.url,
        ],
    )?;
    if changed == 0 {
        return Err(RepositoryError::NotFound(format!("event {}", id)));
    }
    Ok(view(conn, id)?.event)
}

pub fn delete(conn: &Connection, id: i64) -> Result<(), RepositoryError> {
    let removed = conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
    if removed == 0 {
        return Err(RepositoryError::NotFound(format!("event {}", id)));
    }
    Ok(())
}

pub fn author_of(conn: &Connection, id: i64) -> Result<Option<i64>, RepositoryError> {
    conn.query_row("SELECT author_id FROM events WHERE id = ?1", params![id], |r| r.get(0))
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("event {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::events::schedule::{parse_date, parse_time};

    fn fields(summary: &str, start: &str) -> EventFields {
        EventFields {
            summary: summary.into(),
            description: "Beschreibung".into(),
            schedule: Schedule {
                start_date: parse_date(start).unwrap(),
                start_time: None,
                end_date: None,
                end_time: None,
            },
            location: None,
            url: None,
        }
    }

    fn seeded() -> db::PooledConn {
        let pool = db::memory_pool().unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, username, first_name, last_name) VALUES (1, 'org', 'Olga', 'Org')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn upcoming_and_past_split_on_today() {
        let conn = seeded();
        let today = parse_date("2024-06-10").unwrap();
        create(&conn, 1, &fields("Heute", "2024-06-10")).unwrap();
        create(&conn, 1, &fields("Morgen", "2024-06-11")).unwrap();
        create(&conn, 1, &fields("Gestern", "2024-06-09")).unwrap();
        create(&conn, 1, &fields("Letztes Jahr", "2023-06-09")).unwrap();
        create(&conn, 1, &fields("Uralt", "2022-06-10")).unwrap();

        let up: Vec<String> = upcoming(&conn, today)
            .unwrap()
            .into_iter()
            .map(|v| v.event.summary)
            .collect();
        assert_eq!(up, vec!["Heute", "Morgen"]);

        let old: Vec<String> = past(&conn, today)
            .unwrap()
            .into_iter()
            .map(|v| v.event.summary)
            .collect();
        assert_eq!(old, vec!["Gestern", "Letztes Jahr"]);
    }

    #[test]
    fn times_are_stored_as_hours_and_minutes() {
        let conn = seeded();
        let mut f = fields("Grillabend", "2024-06-10");
        f.schedule.start_time = parse_time("18:30:00");
        let event = create(&conn, 1, &f).unwrap();
        assert_eq!(event.start_time.as_deref(), Some("18:30"));
        assert_eq!(event.end_date, None);
        assert_eq!(view(&conn, event.id).unwrap().author_name.as_deref(), Some("Olga Org"));
    }

    #[test]
    fn update_and_delete() {
        let conn = seeded();
        let event = create(&conn, 1, &fields("Alt", "2024-06-10")).unwrap();
        let updated = update(&conn, event.id, &fields("Neu", "2024-07-01")).unwrap();
        assert_eq!(updated.summary, "Neu");
        assert_eq!(updated.start_date, "2024-07-01");
        assert_eq!(author_of(&conn, event.id).unwrap(), Some(1));
        delete(&conn, event.id).unwrap();
        assert!(matches!(view(&conn, event.id), Err(RepositoryError::NotFound(_))));
    }

    #[test]
    fn blank_summary_is_rejected() {
        let conn = seeded();
        assert!(matches!(
            create(&conn, 1, &fields(" ", "2024-06-10")),
            Err(RepositoryError::Validation(_))
        ));
    }
}
