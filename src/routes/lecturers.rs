use askama::Template;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;

use crate::config::RatingPolicyConfig;
use crate::db::models::Lecturer;
use crate::error::{AjaxError, AppError, AppResult};
use crate::extractors::{CurrentUser, LoginRequired};
use crate::lecturers::quotes;
use crate::lecturers::repository as lecturers;
use crate::lecturers::{LecturerListing, QuoteView};
use crate::ratings::{LecturerCategory, RatingError, RatingSubject, RatingSummary};
use crate::routes::home::Html;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lecturers/", get(list))
        .route("/lecturers/{id}/", get(detail))
        .route("/lecturers/{id}/rate", post(rate))
}

#[derive(Template)]
#[template(path = "pages/lecturers.html")]
pub struct LecturersTemplate {
    pub username: Option<String>,
    pub lecturers: Vec<LecturerListing>,
}

/// A score button; `selected` marks the viewer's current rating.
pub struct ScoreChoice {
    pub value: i64,
    pub selected: bool,
}

pub(crate) fn score_choices(policy: RatingPolicyConfig, own: Option<i64>) -> Vec<ScoreChoice> {
    (i64::from(policy.min)..=i64::from(policy.max))
        .map(|value| ScoreChoice {
            value,
            selected: own == Some(value),
        })
        .collect()
}

/// One rating axis on the lecturer page.
pub struct CategoryRating {
    pub tag: &'static str,
    pub label: &'static str,
    pub summary: RatingSummary,
    pub scores: Vec<ScoreChoice>,
}

#[derive(Template)]
#[template(path = "pages/lecturer.html")]
pub struct LecturerTemplate {
    pub username: Option<String>,
    pub lecturer: Lecturer,
    pub name: String,
    pub ratings: Vec<CategoryRating>,
    pub quotes: Vec<QuoteView>,
}

pub async fn list(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
) -> AppResult<Html<LecturersTemplate>> {
    let conn = state.db.get()?;
    Ok(Html(LecturersTemplate {
        username: Some(user.username),
        lecturers: lecturers::list_real(&conn)?,
    }))
}

pub async fn detail(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path(id): Path<i64>,
) -> AppResult<Html<LecturerTemplate>> {
    let (lecturer, quotes) = {
        let conn = state.db.get()?;
        let lecturer = lecturers::get(&conn, id)?;
        let quotes = quotes::list_for_lecturer(&conn, Some(user.id), id)?;
        (lecturer, quotes)
    };

    let mut ratings = Vec::with_capacity(LecturerCategory::ALL.len());
    for category in LecturerCategory::ALL {
        let subject = RatingSubject::Lecturer { id, category };
        let own = state.ratings.rating_of(user.id, subject).await?;
        ratings.push(CategoryRating {
            tag: category.tag(),
            label: category.label(),
            summary: state.ratings.summary(subject).await?,
            scores: score_choices(state.config.ratings.lecturers, own),
        });
    }

    Ok(Html(LecturerTemplate {
        username: Some(user.username),
        name: lecturer.name(),
        lecturer,
        ratings,
        quotes,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RateForm {
    pub category: Option<String>,
    pub score: Option<String>,
}

/// Parse a submitted score; anything but an integer is a validation error.
pub(crate) fn parse_score(score: Option<&str>) -> Result<i64, AppError> {
    score
        .map(str::trim)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| AppError::BadRequest("invalid score".into()))
}

/// POST /lecturers/{id}/rate: AJAX, answers with the new category summary
pub async fn rate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<RateForm>,
) -> Result<Json<RatingSummary>, AjaxError> {
    let category: LecturerCategory = form
        .category
        .as_deref()
        .unwrap_or("")
        .parse()
        .map_err(|e: RatingError| AppError::BadRequest(e.to_string()))?;
    let score = parse_score(form.score.as_deref())?;

    let summary = state
        .ratings
        .upsert(user.id, RatingSubject::Lecturer { id, category }, score)
        .await?;
    Ok(Json(summary))
}
