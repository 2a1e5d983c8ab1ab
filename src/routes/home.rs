use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Local;

use crate::error::AppResult;
use crate::events::repository as events;
use crate::extractors::MaybeUser;
use crate::routes::events::EventRow;
use crate::state::AppState;

const HOME_EVENT_COUNT: usize = 5;

#[derive(Template)]
#[template(path = "pages/home.html")]
pub struct HomeTemplate {
    pub username: Option<String>,
    pub events: Vec<EventRow>,
    pub document_count: i64,
    pub quote_count: i64,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

pub async fn index(State(state): State<AppState>, user: MaybeUser) -> AppResult<Html<HomeTemplate>> {
    let conn = state.db.get()?;
    let today = Local::now().date_naive();

    let events = events::upcoming(&conn, today)?
        .iter()
        .take(HOME_EVENT_COUNT)
        .map(|v| EventRow::new(v, today))
        .collect();
    let document_count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
    let quote_count: i64 = conn.query_row("SELECT COUNT(*) FROM quotes", [], |row| row.get(0))?;

    Ok(Html(HomeTemplate {
        username: user.username(),
        events,
        document_count,
        quote_count,
    }))
}
