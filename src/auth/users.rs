use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::User;
use crate::error::RepositoryError;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Login names may be typed as full mail addresses; only the local part counts.
pub fn normalize_login(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed.split('@').next().unwrap_or(trimmed).trim()
}

pub fn validate_username(username: &str) -> Result<(), RepositoryError> {
    if username.contains('@') {
        return Err(RepositoryError::Validation(
            "Bitte nur vorderen Teil der Mailadresse ohne \"@\" eintragen.".into(),
        ));
    }
    let valid = !username.is_empty()
        && username.len() <= 30
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'));
    if !valid {
        return Err(RepositoryError::Validation(
            "Benutzername: 1-30 Zeichen, nur Buchstaben, Zahlen und . _ - +".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), RepositoryError> {
    if !email.is_empty() && !email.contains('@') {
        return Err(RepositoryError::Validation("Ungültige E-Mail-Adresse.".into()));
    }
    Ok(())
}

pub fn create(
    conn: &Connection,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User, RepositoryError> {
    let username = username.trim();
    validate_username(username)?;
    validate_email(email.trim())?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(RepositoryError::Validation(format!(
            "Passwort muss mindestens {} Zeichen lang sein.",
            MIN_PASSWORD_LEN
        )));
    }
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| RepositoryError::Validation(format!("password hashing failed: {}", e)))?;

    conn.execute(
        "INSERT INTO users (username, email, password_hash) VALUES (?1, ?2, ?3)",
        params![username, email.trim(), hash],
    )?;
    let user = get(conn, conn.last_insert_rowid())?;
    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Check credentials; `None` for unknown users and wrong passwords alike.
pub fn authenticate(
    conn: &Connection,
    login: &str,
    password: &str,
) -> Result<Option<User>, RepositoryError> {
    let username = normalize_login(login);
    let row: Option<(i64, Option<String>)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ?1 COLLATE NOCASE",
            params![username],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((id, Some(hash))) = row else {
        return Ok(None);
    };
    if !bcrypt::verify(password, &hash).unwrap_or(false) {
        return Ok(None);
    }
    get(conn, id).map(Some)
}

pub fn get(conn: &Connection, id: i64) -> Result<User, RepositoryError> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS);
    conn.query_row(&sql, params![id], User::from_row)
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("user {}", id)))
}

pub fn list(conn: &Connection) -> Result<Vec<User>, RepositoryError> {
    let sql = format!("SELECT {} FROM users ORDER BY id", User::COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map([], User::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Profile fields a user may change about themselves; the username is fixed.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub flattr: String,
    #[serde(default)]
    pub twitter: String,
}

pub fn update_profile(conn: &Connection, id: i64, profile: &ProfileUpdate) -> Result<User, RepositoryError> {
    validate_email(profile.email.trim())?;
    let changed = conn.execute(
        "UPDATE users SET first_name = ?2, last_name = ?3, email = ?4, flattr = ?5, twitter = ?6
         WHERE id = ?1",
        params![
            id,
            profile.first_name.trim(),
            profile.last_name.trim(),
            profile.email.trim(),
            profile.flattr.trim(),
            profile.twitter.trim().trim_start_matches('@'),
        ],
    )?;
    if changed == 0 {
        return Err(RepositoryError::NotFound(format!("user {}", id)));
    }
    get(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn login_strips_mail_part() {
        assert_eq!(normalize_login("jdoe@hsr.ch"), "jdoe");
        assert_eq!(normalize_login("  jdoe "), "jdoe");
    }

    #[test]
    fn register_then_authenticate_case_insensitively() {
        let pool = db::memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = create(&conn, "JDoe", "jdoe@example.org", "correct horse").unwrap();

        let found = authenticate(&conn, "jdoe@example.org", "correct horse")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);
        assert!(authenticate(&conn, "JDOE", "wrong password").unwrap().is_none());
        assert!(authenticate(&conn, "nobody", "correct horse").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_conflicts() {
        let pool = db::memory_pool().unwrap();
        let conn = pool.get().unwrap();
        create(&conn, "jdoe", "", "password123").unwrap();
        assert!(matches!(
            create(&conn, "JDOE", "", "password123"),
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[test]
    fn registration_validation() {
        let pool = db::memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert!(matches!(
            create(&conn, "jdoe@hsr.ch", "", "password123"),
            Err(RepositoryError::Validation(_))
        ));
        assert!(matches!(
            create(&conn, "jdoe", "", "short"),
            Err(RepositoryError::Validation(_))
        ));
        assert!(matches!(
            create(&conn, "jdoe", "not-an-address", "password123"),
            Err(RepositoryError::Validation(_))
        ));
    }

    #[test]
    fn profile_update_keeps_username() {
        let pool = db::memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = create(&conn, "jdoe", "", "password123").unwrap();
        let updated = update_profile(
            &conn,
            user.id,
            &ProfileUpdate {
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                twitter: "@janedoe".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.username, "jdoe");
        assert_eq!(updated.name(), "Jane Doe");
        assert_eq!(updated.twitter, "janedoe");
    }
}
