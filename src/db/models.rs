use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub flattr: String,
    pub twitter: String,
    pub is_staff: bool,
    pub date_joined: String,
}

impl User {
    pub const COLUMNS: &'static str =
        "id, username, first_name, last_name, email, flattr, twitter, is_staff, date_joined";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            email: row.get(4)?,
            flattr: row.get(5)?,
            twitter: row.get(6)?,
            is_staff: row.get(7)?,
            date_joined: row.get(8)?,
        })
    }

    /// "First Last" when either part is set, otherwise the username.
    pub fn name(&self) -> String {
        display_name(&self.username, &self.first_name, &self.last_name)
    }
}

pub fn display_name(username: &str, first_name: &str, last_name: &str) -> String {
    let parts: Vec<&str> = [first_name, last_name]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        username.to_string()
    } else {
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Lecturer {
    pub id: i64,
    pub title: Option<String>,
    pub last_name: String,
    pub first_name: String,
    pub abbreviation: String,
    pub department: Option<String>,
    pub function: Option<String>,
    pub main_area: Option<String>,
    pub subjects: Option<String>,
    pub email: Option<String>,
    pub office: Option<String>,
}

impl Lecturer {
    pub const COLUMNS: &'static str = "id, title, last_name, first_name, abbreviation, \
         department, function, main_area, subjects, email, office";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            last_name: row.get(2)?,
            first_name: row.get(3)?,
            abbreviation: row.get(4)?,
            department: row.get(5)?,
            function: row.get(6)?,
            main_area: row.get(7)?,
            subjects: row.get(8)?,
            email: row.get(9)?,
            office: row.get(10)?,
        })
    }

    /// "Title Last First", skipping empty parts.
    pub fn name(&self) -> String {
        [
            self.title.as_deref().unwrap_or(""),
            &self.last_name,
            &self.first_name,
        ]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: i64,
    pub author_id: Option<i64>,
    pub lecturer_id: i64,
    pub date: String,
    pub quote: String,
    pub comment: String,
}

impl Quote {
    pub const COLUMNS: &'static str = "id, author_id, lecturer_id, date, quote, comment";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            author_id: row.get(1)?,
            lecturer_id: row.get(2)?,
            date: row.get(3)?,
            quote: row.get(4)?,
            comment: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCategory {
    pub id: i64,
    pub name: String,
    pub description: String,
}

impl DocumentCategory {
    pub const COLUMNS: &'static str = "id, name, description";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub url: Option<String>,
    pub category_id: i64,
    pub dtype: i64,
    pub file_path: String,
    pub original_filename: String,
    pub uploader_id: Option<i64>,
    pub upload_date: String,
    pub change_date: String,
    pub license: Option<i64>,
    pub public: bool,
}

impl Document {
    pub const COLUMNS: &'static str = "id, name, description, url, category_id, dtype, \
         file_path, original_filename, uploader_id, upload_date, change_date, license, public";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            url: row.get(3)?,
            category_id: row.get(4)?,
            dtype: row.get(5)?,
            file_path: row.get(6)?,
            original_filename: row.get(7)?,
            uploader_id: row.get(8)?,
            upload_date: row.get(9)?,
            change_date: row.get(10)?,
            license: row.get(11)?,
            public: row.get(12)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub author_id: Option<i64>,
    pub summary: String,
    pub description: String,
    pub start_date: String,
    pub start_time: Option<String>,
    pub end_date: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
}

impl Event {
    pub const COLUMNS: &'static str = "id, author_id, summary, description, start_date, \
         start_time, end_date, end_time, location, url";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            author_id: row.get(1)?,
            summary: row.get(2)?,
            description: row.get(3)?,
            start_date: row.get(4)?,
            start_time: row.get(5)?,
            end_date: row.get(6)?,
            end_time: row.get(7)?,
            location: row.get(8)?,
            url: row.get(9)?,
        })
    }
}
