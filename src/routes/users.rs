use askama::Template;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;

use crate::auth::users;
use crate::db::models::User;
use crate::documents::repository as documents;
use crate::documents::DocumentView;
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::lecturers::repository as lecturers;
use crate::routes::home::Html;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/users/{id}/", get(profile))
}

#[derive(Template)]
#[template(path = "pages/user.html")]
pub struct UserTemplate {
    pub username: Option<String>,
    pub user: User,
    pub display_name: String,
    pub rated_count: i64,
    pub uploads: Vec<DocumentView>,
}

/// Public profile: how many lecturers the user rated and what they uploaded.
pub async fn profile(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Html<UserTemplate>> {
    let conn = state.db.get()?;
    let user = users::get(&conn, id)?;
    let rated_count = lecturers::rated_count(&conn, id)?;
    let uploads = documents::list_by_uploader(&conn, id)?;

    Ok(Html(UserTemplate {
        username: viewer.username(),
        display_name: user.name(),
        user,
        rated_count,
        uploads,
    }))
}
