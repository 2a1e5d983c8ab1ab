use askama::Template;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::{Local, NaiveDate};
use serde::Deserialize;

use crate::access::require_owner;
use crate::error::{AppResult, RepositoryError};
use crate::events::ical;
use crate::events::repository::{self as events, EventFields, EventView};
use crate::events::schedule::{parse_date, parse_time, Schedule};
use crate::extractors::{LoginRequired, MaybeUser};
use crate::routes::home::Html;
use crate::routes::non_blank;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events/", get(list))
        .route("/events/calendar.ics", get(calendar))
        .route("/events/add/", get(add_page).post(add))
        .route("/events/{id}/", get(detail))
        .route("/events/{id}/edit/", get(edit_page).post(edit))
        .route("/events/{id}/delete/", post(delete))
}

/// An event as listed on the home and events pages.
pub struct EventRow {
    pub id: i64,
    pub summary: String,
    pub date_label: String,
    pub time_label: Option<String>,
    pub location: Option<String>,
    pub author_name: Option<String>,
    pub is_over: bool,
    pub all_day: bool,
    pub days_until: Option<i64>,
}

impl EventRow {
    pub fn new(view: &EventView, today: NaiveDate) -> Self {
        let event = &view.event;
        let schedule = Schedule::of(event);
        let date_label = match schedule {
            Some(s) => match s.end_date {
                Some(end) if end != s.start_date => format!(
                    "{} – {}",
                    s.start_date.format("%d.%m.%Y"),
                    end.format("%d.%m.%Y")
                ),
                _ => s.start_date.format("%d.%m.%Y").to_string(),
            },
            None => event.start_date.clone(),
        };
        let time_label = match (&event.start_time, &event.end_time) {
            (Some(start), Some(end)) => Some(format!("{} – {}", start, end)),
            (Some(start), None) => Some(start.clone()),
            (None, Some(end)) => Some(format!("bis {}", end)),
            (None, None) => None,
        };
        Self {
            id: event.id,
            summary: event.summary.clone(),
            date_label,
            time_label,
            location: event.location.clone(),
            author_name: view.author_name.clone(),
            is_over: schedule.is_some_and(|s| s.is_over(today)),
            all_day: schedule.is_some_and(|s| s.all_day()),
            days_until: schedule.and_then(|s| s.days_until(today)),
        }
    }
}

#[derive(Template)]
#[template(path = "pages/events.html")]
pub struct EventsTemplate {
    pub username: Option<String>,
    pub future: Vec<EventRow>,
    pub past: Vec<EventRow>,
    pub webcal_url: String,
}

#[derive(Template)]
#[template(path = "pages/event.html")]
pub struct EventTemplate {
    pub username: Option<String>,
    pub row: EventRow,
    pub description: String,
    pub url: Option<String>,
    pub can_edit: bool,
}

#[derive(Template)]
#[template(path = "pages/event_form.html")]
pub struct EventFormTemplate {
    pub username: Option<String>,
    pub action: String,
    pub form: EventForm,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventForm {
    pub summary: String,
    pub description: String,
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
    pub location: String,
    pub url: String,
}

impl EventForm {
    fn from_event(view: &EventView) -> Self {
        let e = &view.event;
        Self {
            summary: e.summary.clone(),
            description: e.description.clone(),
            start_date: e.start_date.clone(),
            start_time: e.start_time.clone().unwrap_or_default(),
            end_date: e.end_date.clone().unwrap_or_default(),
            end_time: e.end_time.clone().unwrap_or_default(),
            location: e.location.clone().unwrap_or_default(),
            url: e.url.clone().unwrap_or_default(),
        }
    }

    fn parse(&self) -> Result<EventFields, String> {
        let start_date =
            parse_date(&self.start_date).ok_or("Ungültiges Startdatum (Format: dd.mm.YYYY).")?;
        let optional_date = |v: &str, msg: &str| match non_blank(Some(v)) {
            Some(v) => parse_date(&v).map(Some).ok_or(msg.to_string()),
            None => Ok(None),
        };
        let optional_time = |v: &str, msg: &str| match non_blank(Some(v)) {
            Some(v) => parse_time(&v).map(Some).ok_or(msg.to_string()),
            None => Ok(None),
        };
        Ok(EventFields {
            summary: self.summary.clone(),
            description: self.description.clone(),
            schedule: Schedule {
                start_date,
                start_time: optional_time(&self.start_time, "Ungültige Startzeit (Format: hh:mm).")?,
                end_date: optional_date(&self.end_date, "Ungültiges Enddatum (Format: dd.mm.YYYY).")?,
                end_time: optional_time(&self.end_time, "Ungültige Endzeit (Format: hh:mm).")?,
            },
            location: non_blank(Some(&self.location)),
            url: non_blank(Some(&self.url)),
        })
    }
}

fn form_page(
    username: String,
    action: String,
    form: EventForm,
    error: Option<String>,
) -> Response {
    let status = if error.is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (
        status,
        Html(EventFormTemplate {
            username: Some(username),
            action,
            form,
            error,
        }),
    )
        .into_response()
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub async fn list(
    State(state): State<AppState>,
    user: MaybeUser,
    headers: HeaderMap,
) -> AppResult<Html<EventsTemplate>> {
    let conn = state.db.get()?;
    let today = today();
    let future = events::upcoming(&conn, today)?
        .iter()
        .map(|v| EventRow::new(v, today))
        .collect();
    let past = events::past(&conn, today)?
        .iter()
        .map(|v| EventRow::new(v, today))
        .collect();
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");

    Ok(Html(EventsTemplate {
        username: user.username(),
        future,
        past,
        webcal_url: format!("webcal://{}/events/calendar.ics", host),
    }))
}

pub async fn calendar(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let conn = state.db.get()?;
    let all = events::all(&conn)?;
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.split(':').next().unwrap_or(h).to_string())
        .unwrap_or_else(|| "localhost".to_string());

    Ok((
        [(header::CONTENT_TYPE, "text/calendar; charset=utf-8")],
        ical::render(&all, &host),
    )
        .into_response())
}

pub async fn detail(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Html<EventTemplate>> {
    let conn = state.db.get()?;
    let view = events::view(&conn, id)?;
    let can_edit = user.id().is_some() && view.event.author_id == user.id();

    Ok(Html(EventTemplate {
        username: user.username(),
        row: EventRow::new(&view, today()),
        description: view.event.description.clone(),
        url: view.event.url.clone(),
        can_edit,
    }))
}

pub async fn add_page(LoginRequired(user): LoginRequired) -> Response {
    form_page(user.username, "/events/add/".into(), EventForm::default(), None)
}

pub async fn add(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Form(form): Form<EventForm>,
) -> AppResult<Response> {
    let fields = match form.parse() {
        Ok(f) => f,
        Err(msg) => return Ok(form_page(user.username, "/events/add/".into(), form, Some(msg))),
    };
    let conn = state.db.get()?;
    match events::create(&conn, user.id, &fields) {
        Ok(event) => {
            tracing::info!(event_id = event.id, author = user.id, "event created");
            Ok(Redirect::to(&format!("/events/{}/", event.id)).into_response())
        }
        Err(RepositoryError::Validation(msg)) => {
            Ok(form_page(user.username, "/events/add/".into(), form, Some(msg)))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn edit_page(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let view = events::view(&conn, id)?;
    require_owner(view.event.author_id, user.id)?;
    Ok(form_page(
        user.username,
        format!("/events/{}/edit/", id),
        EventForm::from_event(&view),
        None,
    ))
}

pub async fn edit(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path(id): Path<i64>,
    Form(form): Form<EventForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    require_owner(events::author_of(&conn, id)?, user.id)?;

    let action = format!("/events/{}/edit/", id);
    let fields = match form.parse() {
        Ok(f) => f,
        Err(msg) => return Ok(form_page(user.username, action, form, Some(msg))),
    };
    match events::update(&conn, id, &fields) {
        Ok(_) => Ok(Redirect::to(&format!("/events/{}/", id)).into_response()),
        Err(RepositoryError::Validation(msg)) => Ok(form_page(user.username, action, form, Some(msg))),
        Err(e) => Err(e.into()),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    require_owner(events::author_of(&conn, id)?, user.id)?;
    events::delete(&conn, id)?;
    tracing::info!(event_id = id, "event deleted");
    Ok(Redirect::to("/events/"))
}
