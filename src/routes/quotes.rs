use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;

use crate::access::require_owner;
use crate::error::{AjaxError, AppError, AppResult, RepositoryError};
use crate::extractors::{CurrentUser, LoginRequired};
use crate::lecturers::quotes::{self, Page, QuoteView, QUOTES_PER_PAGE};
use crate::lecturers::repository as lecturers;
use crate::routes::home::Html;
use crate::state::AppState;
use crate::votes::{VoteAction, VoteOutcome};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/quotes/", get(list))
        .route("/quotes/add/", get(add_page).post(add))
        .route(
            "/lecturers/{id}/quotes/add/",
            get(add_for_lecturer_page).post(add_for_lecturer),
        )
        .route("/quotes/{id}/delete/", post(delete))
        .route("/quotes/{id}/vote", post(vote))
}

#[derive(Template)]
#[template(path = "pages/quotes.html")]
pub struct QuotesTemplate {
    pub username: Option<String>,
    pub quotes: Vec<QuoteView>,
    pub page: Page,
}

pub struct LecturerOption {
    pub id: i64,
    pub name: String,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "pages/quote_form.html")]
pub struct QuoteFormTemplate {
    pub username: Option<String>,
    pub action: String,
    pub lecturers: Vec<LecturerOption>,
    pub quote: String,
    pub comment: String,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QuoteForm {
    pub lecturer: String,
    pub quote: String,
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct VoteForm {
    pub vote: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<QuotesTemplate>> {
    let conn = state.db.get()?;
    let total = quotes::count(&conn)?;
    // Out-of-range or garbage page numbers fall back to the nearest valid page
    let requested = query.page.as_deref().and_then(|p| p.trim().parse().ok());
    let page = Page::new(requested, total, QUOTES_PER_PAGE);

    Ok(Html(QuotesTemplate {
        username: Some(user.username),
        quotes: quotes::list_page(&conn, Some(user.id), &page)?,
        page,
    }))
}

fn form_page(
    state: &AppState,
    username: String,
    action: String,
    form: &QuoteForm,
    selected: Option<i64>,
    error: Option<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let options = lecturers::list_all(&conn)?
        .into_iter()
        .map(|l| LecturerOption {
            id: l.id,
            name: l.name(),
            selected: Some(l.id) == selected,
        })
        .collect();
    let status = if error.is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Html(QuoteFormTemplate {
            username: Some(username),
            action,
            lecturers: options,
            quote: form.quote.clone(),
            comment: form.comment.clone(),
            error,
        }),
    )
        .into_response())
}

async fn create_quote(
    state: &AppState,
    user: CurrentUser,
    action: String,
    lecturer_id: Option<i64>,
    form: QuoteForm,
) -> AppResult<Response> {
    let Some(lecturer_id) = lecturer_id else {
        return form_page(
            state,
            user.username,
            action,
            &form,
            None,
            Some("Bitte einen Dozenten auswählen.".into()),
        );
    };

    let created = {
        let mut conn = state.db.get()?;
        quotes::create(&mut conn, user.id, lecturer_id, &form.quote, &form.comment)
    };
    match created {
        Ok(quote) => Ok(Redirect::to(&format!("/lecturers/{}/", quote.lecturer_id)).into_response()),
        Err(RepositoryError::Validation(msg)) => {
            form_page(state, user.username, action, &form, Some(lecturer_id), Some(msg))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn add_page(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
) -> AppResult<Response> {
    form_page(&state, user.username, "/quotes/add/".into(), &QuoteForm::default(), None, None)
}

pub async fn add(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Form(form): Form<QuoteForm>,
) -> AppResult<Response> {
    let lecturer_id = form.lecturer.trim().parse().ok();
    create_quote(&state, user, "/quotes/add/".into(), lecturer_id, form).await
}

pub async fn add_for_lecturer_page(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    {
        let conn = state.db.get()?;
        lecturers::get(&conn, id)?;
    }
    form_page(
        &state,
        user.username,
        format!("/lecturers/{}/quotes/add/", id),
        &QuoteForm::default(),
        Some(id),
        None,
    )
}

/// The lecturer comes from the path; a `lecturer` form field is ignored.
pub async fn add_for_lecturer(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path(id): Path<i64>,
    Form(form): Form<QuoteForm>,
) -> AppResult<Response> {
    create_quote(
        &state,
        user,
        format!("/lecturers/{}/quotes/add/", id),
        Some(id),
        form,
    )
    .await
}

pub async fn delete(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    let quote = quotes::get(&conn, id)?;
    require_owner(quote.author_id, user.id)?;
    quotes::delete(&conn, id)?;
    tracing::info!(quote_id = id, user_id = user.id, "quote deleted");
    Ok(Redirect::to(&format!("/lecturers/{}/", quote.lecturer_id)))
}

/// POST /quotes/{id}/vote: AJAX, answers with the new tally
pub async fn vote(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<VoteForm>,
) -> Result<Json<VoteOutcome>, AjaxError> {
    let action: VoteAction = form
        .vote
        .as_deref()
        .unwrap_or("")
        .parse()
        .map_err(AppError::BadRequest)?;
    let outcome = state.votes.apply(user.id, id, action).await?;
    Ok(Json(outcome))
}
