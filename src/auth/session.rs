use rand::Rng;
use rusqlite::{params, Connection};

use crate::error::RepositoryError;

/// Create a new session for a user. Returns the session token.
pub fn create_session(conn: &Connection, user_id: i64, hours: u64) -> Result<String, RepositoryError> {
    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Delete a session by token.
pub fn delete_session(conn: &Connection, token: &str) -> Result<(), RepositoryError> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

pub fn purge_expired(conn: &Connection) -> Result<usize, RepositoryError> {
    Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= datetime('now')", [])?)
}

pub fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name,
        token,
        max_age_hours * 3600
    )
}

pub fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn sessions_are_created_and_deleted() {
        let pool = db::memory_pool().unwrap();
        let conn = pool.get().unwrap();
        conn.execute("INSERT INTO users (id, username) VALUES (1, 'u')", [])
            .unwrap();

        let token = create_session(&conn, 1, 1).unwrap();
        let count = |c: &Connection| -> i64 {
            c.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
                .unwrap()
        };
        assert_eq!(count(&conn), 1);
        assert_eq!(purge_expired(&conn).unwrap(), 0);
        delete_session(&conn, &token).unwrap();
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn cookie_uses_configured_name() {
        let cookie = session_cookie("portal_session", "abc", 2);
        assert!(cookie.starts_with("portal_session=abc;"));
        assert!(cookie.contains("Max-Age=7200"));
        assert!(clear_session_cookie("portal_session").contains("Max-Age=0"));
    }
}
