//! End-to-end tests driving the full router
//!
//! Tests cover:
//! - Gated and public document downloads, download deduplication
//! - AJAX voting and rating endpoints
//! - Quote creation with the author's automatic upvote
//! - REST API authentication and ownership rules
//! - The iCalendar feed

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::params;
use tempfile::TempDir;
use tower::ServiceExt;

use portal::auth::session;
use portal::config::Config;
use portal::db;
use portal::documents::domain::DocumentType;
use portal::documents::repository as documents;
use portal::documents::{DocumentFields, StoredFile};
use portal::events::repository::{self as events, EventFields};
use portal::events::schedule::Schedule;
use portal::lecturers::repository::{self as lecturers, LecturerRecord};
use portal::routes;
use portal::state::AppState;

struct TestPortal {
    _dir: TempDir,
    state: AppState,
}

impl TestPortal {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config::rooted_at(dir.path());
        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");
        let state = AppState::new(pool, config);
        Self { _dir: dir, state }
    }

    fn app(&self) -> Router {
        routes::app(self.state.clone())
    }

    /// Insert a user (no password, skips bcrypt) with a live session.
    /// Returns (id, cookie header value).
    fn login(&self, username: &str) -> (i64, String) {
        let conn = self.state.db.get().unwrap();
        conn.execute("INSERT INTO users (username) VALUES (?1)", params![username])
            .unwrap();
        let user_id = conn.last_insert_rowid();
        let token = session::create_session(&conn, user_id, 1).unwrap();
        (
            user_id,
            format!("{}={}", self.state.config.auth.cookie_name, token),
        )
    }

    fn lecturer(&self, abbreviation: &str) -> i64 {
        let mut conn = self.state.db.get().unwrap();
        let record = LecturerRecord {
            abbreviation: abbreviation.into(),
            last_name: "Muster".into(),
            first_name: "Hans".into(),
            title: Some("Prof. Dr.".into()),
            department: Some("I".into()),
            function: Some("Dozent".into()),
            main_area: None,
            subjects: None,
            email: None,
            office: None,
        };
        lecturers::import(&mut conn, &[record]).unwrap();
        conn.query_row(
            "SELECT id FROM lecturers WHERE abbreviation = ?1",
            params![abbreviation],
            |row| row.get(0),
        )
        .unwrap()
    }

    async fn document(&self, uploader: i64, dtype: DocumentType, public: bool) -> i64 {
        let path = self
            .state
            .files
            .save("se1/skript.pdf", b"%PDF-1.4 test")
            .await
            .unwrap();
        let conn = self.state.db.get().unwrap();
        let category = match documents::category_by_name(&conn, "se1") {
            Ok(category) => category,
            Err(_) => documents::create_category(&conn, "se1", "Software Engineering 1").unwrap(),
        };
        let fields = DocumentFields {
            name: "Skript".into(),
            description: "Zusammenfassung".into(),
            url: None,
            dtype: dtype.id(),
            license: None,
            public,
        };
        let file = StoredFile {
            path,
            original_filename: "skript.pdf".into(),
        };
        documents::create(&conn, uploader, category.id, &fields, &file, Utc::now())
            .unwrap()
            .id
    }

    fn count(&self, sql: &str, id: i64) -> i64 {
        let conn = self.state.db.get().unwrap();
        conn.query_row(sql, params![id], |row| row.get(0)).unwrap()
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).header(header::HOST, "portal.test");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, cookie: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::HOST, "portal.test")
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "portal.test")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

// ============================================================================
// DOCUMENT DOWNLOADS
// ============================================================================

#[tokio::test]
async fn test_anonymous_exam_download_redirects_to_login() {
    let portal = TestPortal::new();
    let (uploader, _) = portal.login("anna");
    let doc = portal.document(uploader, DocumentType::Exam, false).await;

    let response = portal
        .app()
        .oneshot(get(&format!("/documents/se1/{}/", doc), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/accounts/login/?next=%2Fdocuments%2Fse1%2F");
    assert_eq!(
        portal.count("SELECT COUNT(*) FROM document_downloads WHERE document_id = ?1", doc),
        0,
        "Refused downloads must not be counted"
    );
}

#[tokio::test]
async fn test_authenticated_download_serves_file() {
    let portal = TestPortal::new();
    let (uploader, cookie) = portal.login("anna");
    let doc = portal.document(uploader, DocumentType::Exam, false).await;

    let mut request = get(&format!("/documents/se1/{}/", doc), Some(&cookie));
    request
        .headers_mut()
        .insert("x-forwarded-for", "10.0.0.7".parse().unwrap());
    let response = portal.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    assert!(response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("skript.pdf"));
    assert_eq!(body_text(response).await, "%PDF-1.4 test");
}

#[tokio::test]
async fn test_public_download_is_counted_once_per_address() {
    let portal = TestPortal::new();
    let (uploader, _) = portal.login("anna");
    let doc = portal.document(uploader, DocumentType::Summary, true).await;
    let uri = format!("/documents/se1/{}/", doc);

    for address in ["10.0.0.1", "172.16.0.1, 10.0.0.1", "10.0.0.2"] {
        let mut request = get(&uri, None);
        request
            .headers_mut()
            .insert("x-forwarded-for", address.parse().unwrap());
        let response = portal.app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(
        portal.count("SELECT COUNT(*) FROM document_downloads WHERE document_id = ?1", doc),
        2,
        "Repeat downloads from one address inside the window count once"
    );
}

#[tokio::test]
async fn test_document_in_wrong_category_is_not_found() {
    let portal = TestPortal::new();
    let (uploader, cookie) = portal.login("anna");
    let doc = portal.document(uploader, DocumentType::Summary, true).await;

    let response = portal
        .app()
        .oneshot(get(&format!("/documents/an1/{}/", doc), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// AJAX ENDPOINTS
// ============================================================================

#[tokio::test]
async fn test_quote_creation_upvotes_for_author() {
    let portal = TestPortal::new();
    let (author, cookie) = portal.login("anna");
    let lecturer = portal.lecturer("MUH");

    let response = portal
        .app()
        .oneshot(post_form(
            &format!("/lecturers/{}/quotes/add/", lecturer),
            &cookie,
            "quote=Das+ist+trivial.&comment=",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/lecturers/{}/", lecturer));

    let conn = portal.state.db.get().unwrap();
    let (quote_id, vote): (i64, bool) = conn
        .query_row(
            "SELECT q.id, v.vote FROM quotes q JOIN quote_votes v ON v.quote_id = q.id
             WHERE q.author_id = ?1 AND v.user_id = ?1",
            params![author],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert!(vote, "Author's vote should be an upvote");
    assert!(quote_id > 0);
}

#[tokio::test]
async fn test_vote_endpoint_returns_tally() {
    let portal = TestPortal::new();
    let (_, author_cookie) = portal.login("anna");
    let (_, voter_cookie) = portal.login("beat");
    let lecturer = portal.lecturer("MUH");

    portal
        .app()
        .oneshot(post_form(
            "/quotes/add/",
            &author_cookie,
            &format!("lecturer={}&quote=Ganz+einfach.", lecturer),
        ))
        .await
        .unwrap();
    let quote_id = portal.count("SELECT MAX(id) FROM quotes WHERE lecturer_id = ?1", lecturer);

    let response = portal
        .app()
        .oneshot(post_form(
            &format!("/quotes/{}/vote", quote_id),
            &voter_cookie,
            "vote=down",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = body_json(response).await;
    assert_eq!(outcome["action"], "down");
    assert_eq!(outcome["vote_count"], 2);
    assert_eq!(outcome["vote_sum"], 0);

    let response = portal
        .app()
        .oneshot(post_form(
            &format!("/quotes/{}/vote", quote_id),
            &voter_cookie,
            "vote=sideways",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Validation error");
}

#[tokio::test]
async fn test_rating_endpoint_validation() {
    let portal = TestPortal::new();
    let (_, cookie) = portal.login("anna");
    let lecturer = portal.lecturer("MUH");
    let uri = format!("/lecturers/{}/rate", lecturer);

    for body in ["category=x&score=5", "category=d&score=11", "category=d&score=viel"] {
        let response = portal
            .app()
            .oneshot(post_form(&uri, &cookie, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(body_text(response).await, "Validation error");
    }

    let response = portal
        .app()
        .oneshot(post_form(&uri, &cookie, "category=d&score=8"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["category"], "d");
    assert_eq!(summary["rating_count"], 1);
    assert_eq!(summary["rating_avg"], 8);
}

#[tokio::test]
async fn test_rating_requires_login() {
    let portal = TestPortal::new();
    let lecturer = portal.lecturer("MUH");

    let request = Request::builder()
        .method("POST")
        .uri(format!("/lecturers/{}/rate", lecturer))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("category=d&score=5"))
        .unwrap();
    let response = portal.app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// REST API
// ============================================================================

#[tokio::test]
async fn test_api_requires_authentication() {
    let portal = TestPortal::new();

    let response = portal.app().oneshot(get("/api/v1/quotes", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Authentication credentials were not provided.");
}

#[tokio::test]
async fn test_api_root_lists_resources() {
    let portal = TestPortal::new();
    let (_, cookie) = portal.login("anna");

    let response = portal
        .app()
        .oneshot(get("/api/v1/", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["quotes"], "http://portal.test/api/v1/quotes");
}

#[tokio::test]
async fn test_api_quote_update_is_owner_only() {
    let portal = TestPortal::new();
    let (_, author_cookie) = portal.login("anna");
    let (_, other_cookie) = portal.login("beat");
    let lecturer = portal.lecturer("MUH");

    let response = portal
        .app()
        .oneshot(json_request(
            "POST",
            "/api/v1/quotes",
            Some(&author_cookie),
            serde_json::json!({
                "lecturer": format!("http://portal.test/api/v1/lecturers/{}", lecturer),
                "quote": "Das kommt an die Prüfung.",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let url = created["url"].as_str().unwrap().to_string();
    let path = url.trim_start_matches("http://portal.test");

    let response = portal
        .app()
        .oneshot(json_request(
            "PUT",
            path,
            Some(&other_cookie),
            serde_json::json!({ "quote": "Übernommen." }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(
        body["detail"],
        "You do not have permission to perform this action."
    );

    let response = portal
        .app()
        .oneshot(json_request(
            "PUT",
            path,
            Some(&author_cookie),
            serde_json::json!({ "quote": "Das kommt sicher an die Prüfung." }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["quote"], "Das kommt sicher an die Prüfung.");
    assert_eq!(updated["lecturer"], created["lecturer"]);
}

// ============================================================================
// EVENTS
// ============================================================================

#[tokio::test]
async fn test_calendar_feed_lists_events() {
    let portal = TestPortal::new();
    let (author, _) = portal.login("anna");
    let event_id = {
        let conn = portal.state.db.get().unwrap();
        let fields = EventFields {
            summary: "Semesterstart".into(),
            description: "Apéro im Foyer".into(),
            schedule: Schedule {
                start_date: NaiveDate::from_ymd_opt(2024, 9, 16).unwrap(),
                start_time: NaiveTime::from_hms_opt(18, 0, 0),
                end_date: None,
                end_time: None,
            },
            location: Some("Foyer".into()),
            url: None,
        };
        events::create(&conn, author, &fields).unwrap().id
    };

    let response = portal
        .app()
        .oneshot(get("/events/calendar.ics", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/calendar"));

    let ics = body_text(response).await;
    assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
    assert!(ics.contains(&format!("UID:event-{}@portal.test\r\n", event_id)));
    assert!(ics.contains("SUMMARY:Semesterstart\r\n"));
    assert!(ics.contains("DTSTART:20240916T180000\r\n"));
}

#[tokio::test]
async fn test_pages_require_login() {
    let portal = TestPortal::new();

    let response = portal.app().oneshot(get("/quotes/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/accounts/login/?next=%2Fquotes%2F");

    let response = portal.app().oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// ACCOUNTS
// ============================================================================

#[tokio::test]
async fn test_register_logs_in_and_rejects_duplicates() {
    let portal = TestPortal::new();
    let form = "username=carla&email=carla%40example.com&password=geheim123&password_confirm=geheim123";

    let request = Request::builder()
        .method("POST")
        .uri("/accounts/register/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let response = portal.app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let response = portal
        .app()
        .oneshot(get("/profile/", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("carla"));

    let request = Request::builder()
        .method("POST")
        .uri("/accounts/register/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.replace("carla", "CARLA")))
        .unwrap();
    let response = portal.app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("bereits vergeben"));
}
