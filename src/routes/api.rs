// REST API under /api/v1: session auth, JSON in and out
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::access::require_owner;
use crate::auth::users::{self, ProfileUpdate};
use crate::db::models::{Lecturer, Quote, User};
use crate::documents::domain::{DocumentType, License};
use crate::documents::repository as documents;
use crate::documents::DocumentView;
use crate::error::{ApiError, ApiResult, AppError};
use crate::extractors::ApiUser;
use crate::lecturers::quotes;
use crate::lecturers::repository as lecturers;
use crate::ratings::{LecturerCategory, RatingError, RatingSubject, RatingSummary};
use crate::state::AppState;
use crate::votes::{VoteAction, VoteOutcome};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/users", get(user_list))
        .route("/users/{id}", get(user_detail).put(user_update))
        .route("/lecturers", get(lecturer_list))
        .route("/lecturers/{id}", get(lecturer_detail))
        .route("/lecturers/{id}/rate", post(lecturer_rate))
        .route("/quotes", get(quote_list).post(quote_create))
        .route("/quotes/{id}", get(quote_detail).put(quote_update))
        .route("/quotes/{id}/vote", post(quote_vote))
        .route("/documents", get(document_list))
        .route("/documents/{id}", get(document_detail))
}

/// List responses: `{"count": n, "results": [...]}`.
#[derive(Debug, Serialize)]
pub struct Listing<T> {
    pub count: usize,
    pub results: Vec<T>,
}

impl<T> From<Vec<T>> for Listing<T> {
    fn from(results: Vec<T>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

/// Absolute resource URLs for the requesting host.
pub struct Links {
    base: String,
}

impl Links {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        Self {
            base: format!("http://{}/api/v1", host),
        }
    }

    pub fn resource(&self, kind: &str) -> String {
        format!("{}/{}", self.base, kind)
    }

    pub fn item(&self, kind: &str, id: i64) -> String {
        format!("{}/{}/{}", self.base, kind, id)
    }
}

/// Malformed JSON bodies become a 400 with the parser's message.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError(AppError::BadRequest(e.body_text())))
}

pub async fn root(ApiUser(_): ApiUser, headers: HeaderMap) -> Json<serde_json::Value> {
    let links = Links::from_headers(&headers);
    Json(serde_json::json!({
        "users": links.resource("users"),
        "lecturers": links.resource("lecturers"),
        "quotes": links.resource("quotes"),
        "documents": links.resource("documents"),
    }))
}

// -- Users --

#[derive(Debug, Serialize)]
pub struct UserOut {
    pub url: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub flattr: String,
    pub twitter: String,
}

impl UserOut {
    fn new(user: User, links: &Links) -> Self {
        Self {
            url: links.item("users", user.id),
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            flattr: user.flattr,
            twitter: user.twitter,
        }
    }
}

pub async fn user_list(
    State(state): State<AppState>,
    ApiUser(_): ApiUser,
    headers: HeaderMap,
) -> ApiResult<Json<Listing<UserOut>>> {
    let links = Links::from_headers(&headers);
    let conn = state.db.get()?;
    let results: Vec<UserOut> = users::list(&conn)?
        .into_iter()
        .map(|u| UserOut::new(u, &links))
        .collect();
    Ok(Json(results.into()))
}

pub async fn user_detail(
    State(state): State<AppState>,
    ApiUser(_): ApiUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserOut>> {
    let conn = state.db.get()?;
    let user = users::get(&conn, id)?;
    Ok(Json(UserOut::new(user, &Links::from_headers(&headers))))
}

/// The username is not part of `ProfileUpdate`, so it can't change here.
pub async fn user_update(
    State(state): State<AppState>,
    ApiUser(caller): ApiUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<UserOut>> {
    let conn = state.db.get()?;
    users::get(&conn, id)?;
    require_owner(Some(id), caller.id)?;
    let profile = json_body(body)?;
    let user = users::update_profile(&conn, id, &profile)?;
    Ok(Json(UserOut::new(user, &Links::from_headers(&headers))))
}

// -- Lecturers --

#[derive(Debug, Serialize)]
pub struct LecturerOut {
    pub url: String,
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
    pub quotes: Vec<String>,
    pub avg_rating_d: i64,
    pub avg_rating_m: i64,
    pub avg_rating_f: i64,
}

async fn lecturer_out(state: &AppState, lecturer: Lecturer, links: &Links) -> ApiResult<LecturerOut> {
    let quote_ids = {
        let conn = state.db.get()?;
        lecturers::quote_ids(&conn, lecturer.id)?
    };
    let mut averages = [0i64; 3];
    for (avg, category) in averages.iter_mut().zip(LecturerCategory::ALL) {
        let subject = RatingSubject::Lecturer {
            id: lecturer.id,
            category,
        };
        *avg = state.ratings.summary(subject).await?.rating_avg;
    }
    let [avg_rating_d, avg_rating_m, avg_rating_f] = averages;

    Ok(LecturerOut {
        url: links.item("lecturers", lecturer.id),
        title: lecturer.title,
        last_name: lecturer.last_name,
        first_name: lecturer.first_name,
        abbreviation: lecturer.abbreviation,
        department: lecturer.department,
        function: lecturer.function,
        main_area: lecturer.main_area,
        subjects: lecturer.subjects,
        email: lecturer.email,
        office: lecturer.office,
        quotes: quote_ids.into_iter().map(|q| links.item("quotes", q)).collect(),
        avg_rating_d,
        avg_rating_m,
        avg_rating_f,
    })
}

pub async fn lecturer_list(
    State(state): State<AppState>,
    ApiUser(_): ApiUser,
    headers: HeaderMap,
) -> ApiResult<Json<Listing<LecturerOut>>> {
    let links = Links::from_headers(&headers);
    let listings = {
        let conn = state.db.get()?;
        lecturers::list_real(&conn)?
    };
    let mut results = Vec::with_capacity(listings.len());
    for listing in listings {
        results.push(lecturer_out(&state, listing.lecturer, &links).await?);
    }
    Ok(Json(results.into()))
}

pub async fn lecturer_detail(
    State(state): State<AppState>,
    ApiUser(_): ApiUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<LecturerOut>> {
    let lecturer = {
        let conn = state.db.get()?;
        lecturers::get_real(&conn, id)?
    };
    let out = lecturer_out(&state, lecturer, &Links::from_headers(&headers)).await?;
    Ok(Json(out))
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub category: Option<String>,
    pub score: i64,
}

pub async fn lecturer_rate(
    State(state): State<AppState>,
    ApiUser(caller): ApiUser,
    Path(id): Path<i64>,
    body: Result<Json<RateRequest>, JsonRejection>,
) -> ApiResult<Json<RatingSummary>> {
    let request = json_body(body)?;
    let category: LecturerCategory = request
        .category
        .as_deref()
        .unwrap_or("")
        .parse()
        .map_err(|e: RatingError| AppError::BadRequest(e.to_string()))?;
    let summary = state
        .ratings
        .upsert(caller.id, RatingSubject::Lecturer { id, category }, request.score)
        .await?;
    Ok(Json(summary))
}

// -- Quotes --

#[derive(Debug, Serialize)]
pub struct QuoteOut {
    pub url: String,
    pub lecturer: String,
    pub lecturer_name: String,
    pub date: String,
    pub quote: String,
    pub comment: String,
}

impl QuoteOut {
    fn new(quote: Quote, lecturer_name: String, links: &Links) -> Self {
        Self {
            url: links.item("quotes", quote.id),
            lecturer: links.item("lecturers", quote.lecturer_id),
            lecturer_name,
            date: quote.date,
            quote: quote.quote,
            comment: quote.comment,
        }
    }
}

/// A lecturer given either by id or by its API URL.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LecturerRef {
    Id(i64),
    Url(String),
}

impl LecturerRef {
    fn id(&self) -> Result<i64, AppError> {
        match self {
            LecturerRef::Id(id) => Ok(*id),
            LecturerRef::Url(url) => url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .and_then(|last| last.parse().ok())
                .ok_or_else(|| AppError::BadRequest(format!("invalid lecturer '{}'", url))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub lecturer: Option<LecturerRef>,
    pub quote: String,
    #[serde(default)]
    pub comment: String,
}

fn quote_out(conn: &rusqlite::Connection, quote: Quote, links: &Links) -> ApiResult<QuoteOut> {
    let lecturer_name = lecturers::get(conn, quote.lecturer_id)?.name();
    Ok(QuoteOut::new(quote, lecturer_name, links))
}

pub async fn quote_list(
    State(state): State<AppState>,
    ApiUser(_): ApiUser,
    headers: HeaderMap,
) -> ApiResult<Json<Listing<QuoteOut>>> {
    let links = Links::from_headers(&headers);
    let conn = state.db.get()?;
    let names: HashMap<i64, String> = lecturers::list_all(&conn)?
        .into_iter()
        .map(|l| (l.id, l.name()))
        .collect();
    let results: Vec<QuoteOut> = quotes::list_all(&conn)?
        .into_iter()
        .map(|q| {
            let name = names.get(&q.lecturer_id).cloned().unwrap_or_default();
            QuoteOut::new(q, name, &links)
        })
        .collect();
    Ok(Json(results.into()))
}

/// The caller becomes the author and the quote starts with their upvote.
pub async fn quote_create(
    State(state): State<AppState>,
    ApiUser(caller): ApiUser,
    headers: HeaderMap,
    body: Result<Json<QuoteRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let request = json_body(body)?;
    let lecturer_id = request
        .lecturer
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("lecturer is required".into()))?
        .id()?;

    let mut conn = state.db.get()?;
    let quote = quotes::create(&mut conn, caller.id, lecturer_id, &request.quote, &request.comment)?;
    let out = quote_out(&conn, quote, &Links::from_headers(&headers))?;
    Ok((StatusCode::CREATED, Json(out)))
}

pub async fn quote_detail(
    State(state): State<AppState>,
    ApiUser(_): ApiUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<QuoteOut>> {
    let conn = state.db.get()?;
    let quote = quotes::get(&conn, id)?;
    Ok(Json(quote_out(&conn, quote, &Links::from_headers(&headers))?))
}

/// Owner only; the author never changes, an omitted lecturer is kept.
pub async fn quote_update(
    State(state): State<AppState>,
    ApiUser(caller): ApiUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Result<Json<QuoteRequest>, JsonRejection>,
) -> ApiResult<Json<QuoteOut>> {
    let conn = state.db.get()?;
    let existing = quotes::get(&conn, id)?;
    require_owner(existing.author_id, caller.id)?;

    let request = json_body(body)?;
    let lecturer_id = match &request.lecturer {
        Some(lecturer) => lecturer.id()?,
        None => existing.lecturer_id,
    };
    let quote = quotes::update(&conn, id, lecturer_id, &request.quote, &request.comment)?;
    Ok(Json(quote_out(&conn, quote, &Links::from_headers(&headers))?))
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote: VoteAction,
}

pub async fn quote_vote(
    State(state): State<AppState>,
    ApiUser(caller): ApiUser,
    Path(id): Path<i64>,
    body: Result<Json<VoteRequest>, JsonRejection>,
) -> ApiResult<Json<VoteOutcome>> {
    let request = json_body(body)?;
    let outcome = state.votes.apply(caller.id, id, request.vote).await?;
    Ok(Json(outcome))
}

// -- Documents (read-only) --

#[derive(Debug, Serialize)]
pub struct DocumentOut {
    pub url: String,
    pub name: String,
    pub description: String,
    pub link: Option<String>,
    pub category: i64,
    pub category_name: String,
    pub dtype: i64,
    pub dtype_name: String,
    pub license: Option<i64>,
    pub license_name: Option<String>,
    pub public: bool,
    pub original_filename: String,
    pub uploader: Option<String>,
    pub uploader_name: Option<String>,
    pub upload_date: String,
    pub change_date: String,
    pub rating: i64,
    pub rating_exact: f64,
    pub rating_count: i64,
    pub downloadcount: i64,
}

impl DocumentOut {
    fn new(view: DocumentView, links: &Links) -> Self {
        let doc = view.document;
        Self {
            url: links.item("documents", doc.id),
            dtype_name: DocumentType::from_id(doc.dtype)
                .map(|t| t.label().to_string())
                .unwrap_or_default(),
            license_name: doc
                .license
                .and_then(License::from_id)
                .map(|l| l.name().to_string()),
            uploader: doc.uploader_id.map(|u| links.item("users", u)),
            name: doc.name,
            description: doc.description,
            link: doc.url,
            category: doc.category_id,
            category_name: view.category_name,
            dtype: doc.dtype,
            license: doc.license,
            public: doc.public,
            original_filename: doc.original_filename,
            uploader_name: view.uploader_name,
            upload_date: doc.upload_date,
            change_date: doc.change_date,
            rating: view.rating.rating_avg,
            rating_exact: view.rating.rating_exact,
            rating_count: view.rating.rating_count,
            downloadcount: view.download_count,
        }
    }
}

pub async fn document_list(
    State(state): State<AppState>,
    ApiUser(_): ApiUser,
    headers: HeaderMap,
) -> ApiResult<Json<Listing<DocumentOut>>> {
    let links = Links::from_headers(&headers);
    let conn = state.db.get()?;
    let results: Vec<DocumentOut> = documents::list_all(&conn)?
        .into_iter()
        .map(|v| DocumentOut::new(v, &links))
        .collect();
    Ok(Json(results.into()))
}

pub async fn document_detail(
    State(state): State<AppState>,
    ApiUser(_): ApiUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<DocumentOut>> {
    let conn = state.db.get()?;
    let view = documents::view(&conn, id)?;
    Ok(Json(DocumentOut::new(view, &Links::from_headers(&headers))))
}
