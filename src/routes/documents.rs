use askama::Template;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;

use crate::access::{document_access, gated_document_redirect, is_owner, require_owner};
use crate::config::RatingPolicyConfig;
use crate::db::models::{Document, DocumentCategory};
use crate::documents::domain::{
    content_disposition, extension, is_github, is_pdf, storage_path, validate_metadata,
    DocumentType, License, LicenseDetails,
};
use crate::documents::repository as documents;
use crate::documents::{CategoryListing, DocumentFields, DocumentView, StoredFile};
use crate::error::{AjaxError, AppError, AppResult, RepositoryError};
use crate::extractors::{ClientAddr, CurrentUser, LoginRequired, MaybeUser};
use crate::ratings::{RatingSubject, RatingSummary};
use crate::routes::home::Html;
use crate::routes::lecturers::{parse_score, score_choices, ScoreChoice};
use crate::routes::{checkbox, non_blank};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/documents/", get(categories))
        .route("/documents/add/", get(add_category_page).post(add_category))
        .route("/documents/{category}/", get(list))
        .route("/documents/{category}/add/", get(upload_page).post(upload))
        .route(
            "/documents/{category}/ajax_rating_block/{id}/",
            get(rating_block),
        )
        .route("/documents/{category}/{id}/", get(download))
        .route("/documents/{category}/{id}/edit/", get(edit_page).post(edit))
        .route("/documents/{category}/{id}/delete/", post(delete))
        .route("/documents/{category}/{id}/rate", post(rate))
}

// -- Templates --

#[derive(Template)]
#[template(path = "pages/categories.html")]
pub struct CategoriesTemplate {
    pub username: Option<String>,
    pub categories: Vec<CategoryListing>,
}

#[derive(Template)]
#[template(path = "pages/category_form.html")]
pub struct CategoryFormTemplate {
    pub username: Option<String>,
    pub name: String,
    pub description: String,
    pub error: Option<String>,
}

/// A document as shown in the category listing.
pub struct DocumentRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub url: Option<String>,
    pub type_label: &'static str,
    pub extension: String,
    pub is_pdf: bool,
    pub is_github: bool,
    pub uploader_id: Option<i64>,
    pub uploader_name: Option<String>,
    pub change_date: String,
    pub license: Option<LicenseDetails>,
    pub public: bool,
    pub rating: RatingSummary,
    pub download_count: i64,
    pub own_rating: Option<i64>,
    pub scores: Vec<ScoreChoice>,
    pub can_edit: bool,
}

impl DocumentRow {
    fn new(
        view: DocumentView,
        viewer: Option<i64>,
        own_ratings: &HashMap<i64, i64>,
        policy: RatingPolicyConfig,
    ) -> Self {
        let doc = view.document;
        let own_rating = own_ratings.get(&doc.id).copied();
        Self {
            id: doc.id,
            type_label: DocumentType::from_id(doc.dtype).map_or("", |t| t.label()),
            extension: extension(&doc.original_filename),
            is_pdf: is_pdf(&doc.original_filename),
            is_github: is_github(doc.url.as_deref()),
            license: doc.license.and_then(License::from_id).map(|l| l.details()),
            own_rating,
            scores: score_choices(policy, own_rating),
            can_edit: viewer.is_some_and(|v| is_owner(doc.uploader_id, v)),
            name: doc.name,
            description: doc.description,
            url: doc.url,
            uploader_id: doc.uploader_id,
            uploader_name: view.uploader_name,
            change_date: doc.change_date,
            public: doc.public,
            rating: view.rating,
            download_count: view.download_count,
        }
    }
}

#[derive(Template)]
#[template(path = "pages/documents.html")]
pub struct DocumentsTemplate {
    pub username: Option<String>,
    pub category: DocumentCategory,
    pub documents: Vec<DocumentRow>,
}

pub struct Choice {
    pub id: i64,
    pub label: &'static str,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "pages/document_form.html")]
pub struct DocumentFormTemplate {
    pub username: Option<String>,
    pub action: String,
    pub category: DocumentCategory,
    pub form: UploadForm,
    pub types: Vec<Choice>,
    pub licenses: Vec<Choice>,
    pub file_required: bool,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "fragments/document_rating.html")]
pub struct RatingBlockTemplate {
    pub category: String,
    pub document_id: i64,
    pub summary: RatingSummary,
    pub own_rating: Option<i64>,
    pub scores: Vec<ScoreChoice>,
}

// -- Forms --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CategoryForm {
    pub name: String,
    pub description: String,
}

/// Upload/edit form values as submitted; the file part is kept separately.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub name: String,
    pub description: String,
    pub url: String,
    pub dtype: i64,
    pub license: Option<i64>,
    pub public: bool,
}

impl UploadForm {
    fn from_document(doc: &Document) -> Self {
        Self {
            name: doc.name.clone(),
            description: doc.description.clone(),
            url: doc.url.clone().unwrap_or_default(),
            dtype: doc.dtype,
            license: doc.license,
            public: doc.public,
        }
    }

    fn fields(&self) -> Result<DocumentFields, String> {
        let dtype = validate_metadata(&self.name, self.dtype, self.license, self.public)?;
        Ok(DocumentFields {
            name: self.name.clone(),
            description: self.description.clone(),
            url: non_blank(Some(&self.url)),
            dtype: dtype.id(),
            license: self.license,
            public: self.public,
        })
    }
}

struct UploadedFile {
    filename: String,
    bytes: Bytes,
}

/// Read the multipart body. An empty file input counts as no file.
async fn read_upload(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<(UploadForm, Option<UploadedFile>), AppError> {
    let bad = |e: axum::extract::multipart::MultipartError| AppError::BadRequest(e.to_string());
    let mut form = UploadForm::default();
    let mut file = None;
    let mut public = None;

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(bad)?;
            if bytes.len() > max_bytes {
                return Err(AppError::BadRequest(format!(
                    "Datei ist zu gross (maximal {} MB).",
                    max_bytes / (1024 * 1024)
                )));
            }
            if !filename.is_empty() && !bytes.is_empty() {
                file = Some(UploadedFile { filename, bytes });
            }
            continue;
        }

        let value = field.text().await.map_err(bad)?;
        match name.as_str() {
            "name" => form.name = value,
            "description" => form.description = value,
            "url" => form.url = value,
            "dtype" => form.dtype = value.trim().parse().unwrap_or(0),
            "license" => form.license = value.trim().parse().ok(),
            "public" => public = Some(value),
            _ => {}
        }
    }
    form.public = checkbox(public.as_deref());
    Ok((form, file))
}

// -- Helpers --

fn choices(form: &UploadForm) -> (Vec<Choice>, Vec<Choice>) {
    let types = DocumentType::ALL
        .into_iter()
        .map(|t| Choice {
            id: t.id(),
            label: t.label(),
            selected: t.id() == form.dtype,
        })
        .collect();
    let licenses = License::ALL
        .into_iter()
        .map(|l| Choice {
            id: l.id(),
            label: l.name(),
            selected: Some(l.id()) == form.license,
        })
        .collect();
    (types, licenses)
}

fn form_page(
    username: String,
    action: String,
    category: DocumentCategory,
    form: UploadForm,
    file_required: bool,
    error: Option<String>,
) -> Response {
    let (types, licenses) = choices(&form);
    let status = if error.is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (
        status,
        Html(DocumentFormTemplate {
            username: Some(username),
            action,
            category,
            form,
            types,
            licenses,
            file_required,
            error,
        }),
    )
        .into_response()
}

/// A document addressed through its category; a mismatching category is a 404.
fn load_in_category(
    state: &AppState,
    category: &str,
    id: i64,
) -> Result<(DocumentCategory, Document), AppError> {
    let conn = state.db.get()?;
    let category = documents::category_by_name(&conn, category)?;
    let doc = documents::get(&conn, id)?;
    if doc.category_id != category.id {
        return Err(AppError::NotFound);
    }
    Ok((category, doc))
}

fn category_url(category: &DocumentCategory) -> String {
    format!("/documents/{}/", category.name)
}

// -- Categories --

pub async fn categories(
    State(state): State<AppState>,
    user: MaybeUser,
) -> AppResult<Html<CategoriesTemplate>> {
    let conn = state.db.get()?;
    Ok(Html(CategoriesTemplate {
        username: user.username(),
        categories: documents::list_categories(&conn)?,
    }))
}

pub async fn add_category_page(LoginRequired(user): LoginRequired) -> Html<CategoryFormTemplate> {
    Html(CategoryFormTemplate {
        username: Some(user.username),
        name: String::new(),
        description: String::new(),
        error: None,
    })
}

pub async fn add_category(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Form(form): Form<CategoryForm>,
) -> AppResult<Response> {
    let created = {
        let conn = state.db.get()?;
        documents::create_category(&conn, &form.name, &form.description)
    };
    let error = match created {
        Ok(category) => {
            tracing::info!(category = %category.name, user_id = user.id, "category created");
            return Ok(Redirect::to(&category_url(&category)).into_response());
        }
        Err(RepositoryError::Validation(msg)) => msg,
        Err(RepositoryError::Conflict(_)) => "Dieses Modul existiert bereits.".to_string(),
        Err(e) => return Err(e.into()),
    };
    Ok((
        StatusCode::BAD_REQUEST,
        Html(CategoryFormTemplate {
            username: Some(user.username),
            name: form.name,
            description: form.description,
            error: Some(error),
        }),
    )
        .into_response())
}

// -- Documents --

pub async fn list(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(category): Path<String>,
) -> AppResult<Html<DocumentsTemplate>> {
    let (category, views) = {
        let conn = state.db.get()?;
        let category = documents::category_by_name(&conn, &category)?;
        let views = documents::list_in_category(&conn, category.id)?;
        (category, views)
    };
    let own_ratings = match user.id() {
        Some(id) => state.ratings.document_ratings_by(id).await?,
        None => HashMap::new(),
    };

    let viewer = user.id();
    Ok(Html(DocumentsTemplate {
        username: user.username(),
        documents: views
            .into_iter()
            .map(|v| DocumentRow::new(v, viewer, &own_ratings, state.config.ratings.documents))
            .collect(),
        category,
    }))
}

pub async fn upload_page(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path(category): Path<String>,
) -> AppResult<Response> {
    let category = {
        let conn = state.db.get()?;
        documents::category_by_name(&conn, &category)?
    };
    let action = format!("{}add/", category_url(&category));
    let form = UploadForm {
        dtype: DocumentType::Summary.id(),
        ..Default::default()
    };
    Ok(form_page(user.username, action, category, form, true, None))
}

pub async fn upload(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path(category): Path<String>,
    multipart: Multipart,
) -> AppResult<Response> {
    let category = {
        let conn = state.db.get()?;
        documents::category_by_name(&conn, &category)?
    };
    let action = format!("{}add/", category_url(&category));
    let (form, file) = read_upload(multipart, state.config.storage.max_upload_bytes).await?;

    let fields = match form.fields() {
        Ok(f) => f,
        Err(msg) => return Ok(form_page(user.username, action, category, form, true, Some(msg))),
    };
    let Some(file) = file else {
        let msg = "Bitte eine Datei auswählen.".to_string();
        return Ok(form_page(user.username, action, category, form, true, Some(msg)));
    };

    let now = Utc::now();
    let path = storage_path(&category.name, &file.filename, now);
    let stored = StoredFile {
        path: state.files.save(&path, &file.bytes).await?,
        original_filename: file.filename,
    };

    let created = {
        let conn = state.db.get()?;
        documents::create(&conn, user.id, category.id, &fields, &stored, now)
    };
    match created {
        Ok(doc) => {
            tracing::info!(
                document_id = doc.id,
                category = %category.name,
                uploader = user.id,
                size = file.bytes.len(),
                "document uploaded"
            );
            Ok(Redirect::to(&category_url(&category)).into_response())
        }
        Err(e) => {
            state.files.remove(&stored.path).await;
            Err(e.into())
        }
    }
}

pub async fn edit_page(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path((category, id)): Path<(String, i64)>,
) -> AppResult<Response> {
    let (category, doc) = load_in_category(&state, &category, id)?;
    require_owner(doc.uploader_id, user.id)?;
    let action = format!("{}{}/edit/", category_url(&category), id);
    let form = UploadForm::from_document(&doc);
    Ok(form_page(user.username, action, category, form, false, None))
}

pub async fn edit(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path((category, id)): Path<(String, i64)>,
    multipart: Multipart,
) -> AppResult<Response> {
    let (category, doc) = load_in_category(&state, &category, id)?;
    require_owner(doc.uploader_id, user.id)?;
    let action = format!("{}{}/edit/", category_url(&category), id);
    let (form, file) = read_upload(multipart, state.config.storage.max_upload_bytes).await?;

    let fields = match form.fields() {
        Ok(f) => f,
        Err(msg) => return Ok(form_page(user.username, action, category, form, false, Some(msg))),
    };

    let now = Utc::now();
    let stored = match file {
        Some(file) => {
            let path = storage_path(&category.name, &file.filename, now);
            Some(StoredFile {
                path: state.files.save(&path, &file.bytes).await?,
                original_filename: file.filename,
            })
        }
        None => None,
    };

    let updated = {
        let conn = state.db.get()?;
        documents::update(&conn, id, category.id, &fields, stored.as_ref(), now)
    };
    match updated {
        Ok((_, replaced)) => {
            if let Some(old) = replaced {
                state.files.remove(&old).await;
            }
            tracing::info!(document_id = id, file_changed = stored.is_some(), "document updated");
            Ok(Redirect::to(&category_url(&category)).into_response())
        }
        Err(e) => {
            if let Some(stored) = &stored {
                state.files.remove(&stored.path).await;
            }
            Err(e.into())
        }
    }
}

pub async fn delete(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path((category, id)): Path<(String, i64)>,
) -> AppResult<Redirect> {
    let (category, doc) = load_in_category(&state, &category, id)?;
    require_owner(doc.uploader_id, user.id)?;
    let path = {
        let conn = state.db.get()?;
        documents::delete(&conn, id)?
    };
    state.files.remove(&path).await;
    tracing::info!(document_id = id, user_id = user.id, "document deleted");
    Ok(Redirect::to(&category_url(&category)))
}

/// Serve the stored file. Anonymous requests for gated documents go to the
/// login form and are not counted.
pub async fn download(
    State(state): State<AppState>,
    user: MaybeUser,
    client: Result<ClientAddr, AppError>,
    Path((category, id)): Path<(String, i64)>,
) -> AppResult<Response> {
    let (category, doc) = load_in_category(&state, &category, id)?;
    if !document_access(&doc).permits(user.0.is_some()) {
        return Ok(Redirect::to(&gated_document_redirect(&category.name)).into_response());
    }

    let ClientAddr(address) = client?;
    let counted = state.downloads.record(doc.id, &address, Utc::now()).await?;
    if !counted {
        tracing::debug!(document_id = doc.id, %address, "repeat download not counted");
    }

    let bytes = state.files.read(&doc.file_path).await?;
    let mime = mime_guess::from_path(&doc.original_filename).first_or_octet_stream();
    Ok((
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&doc.original_filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ScoreForm {
    pub score: Option<String>,
}

/// POST /documents/{category}/{id}/rate: AJAX, answers with the new summary
pub async fn rate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((_category, id)): Path<(String, i64)>,
    Form(form): Form<ScoreForm>,
) -> Result<Json<RatingSummary>, AjaxError> {
    let score = parse_score(form.score.as_deref())?;
    let summary = state
        .ratings
        .upsert(user.id, RatingSubject::Document { id }, score)
        .await?;
    Ok(Json(summary))
}

pub async fn rating_block(
    State(state): State<AppState>,
    user: MaybeUser,
    Path((category, id)): Path<(String, i64)>,
) -> AppResult<Html<RatingBlockTemplate>> {
    let Some(user_id) = user.id() else {
        return Err(AppError::Forbidden);
    };
    let (category, doc) = load_in_category(&state, &category, id)?;
    let subject = RatingSubject::Document { id: doc.id };
    let own_rating = state.ratings.rating_of(user_id, subject).await?;

    Ok(Html(RatingBlockTemplate {
        category: category.name,
        document_id: doc.id,
        summary: state.ratings.summary(subject).await?,
        own_rating,
        scores: score_choices(state.config.ratings.documents, own_rating),
    }))
}
