use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use crate::access::safe_next;
use crate::auth::{session, users};
use crate::auth::users::ProfileUpdate;
use crate::db::models::User;
use crate::error::{AppResult, RepositoryError};
use crate::extractors::{extract_session_token, LoginRequired, MaybeUser};
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub username: Option<String>,
    pub login: String,
    pub next: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/register.html")]
pub struct RegisterTemplate {
    pub username: Option<String>,
    pub form: RegisterForm,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub username: Option<String>,
    pub user: User,
    pub saved: bool,
    pub error: Option<String>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

// -- Helpers --

/// 303 to `location`, setting the given cookie on the way.
fn redirect_with_cookie(location: &str, cookie: String) -> Response {
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, location.to_string()),
            (header::SET_COOKIE, cookie),
        ],
        "",
    )
        .into_response()
}

fn start_session(state: &AppState, user_id: i64, location: &str) -> AppResult<Response> {
    let conn = state.db.get()?;
    let hours = state.config.auth.session_hours;
    let token = session::create_session(&conn, user_id, hours)?;
    Ok(redirect_with_cookie(
        location,
        session::session_cookie(&state.config.auth.cookie_name, &token, hours),
    ))
}

// -- Login / logout --

/// GET /accounts/login/: render login form
pub async fn login_page(user: MaybeUser, Query(query): Query<NextQuery>) -> Html<LoginTemplate> {
    Html(LoginTemplate {
        username: user.username(),
        login: String::new(),
        next: safe_next(query.next.as_deref()).to_string(),
        error: None,
    })
}

/// POST /accounts/login/: check credentials and start a session
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> AppResult<Response> {
    let next = safe_next(form.next.as_deref()).to_string();
    let found = {
        let conn = state.db.get()?;
        users::authenticate(&conn, &form.username, &form.password)?
    };

    match found {
        Some(user) => {
            tracing::info!(user_id = user.id, username = %user.username, "login");
            start_session(&state, user.id, &next)
        }
        None => {
            tracing::info!(login = %users::normalize_login(&form.username), "failed login");
            Ok((
                StatusCode::UNAUTHORIZED,
                Html(LoginTemplate {
                    username: None,
                    login: form.username,
                    next,
                    error: Some(
                        "Benutzername oder Passwort ist falsch.".to_string(),
                    ),
                }),
            )
                .into_response())
        }
    }
}

/// POST /accounts/logout/: end the current session
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = extract_session_token(&headers, cookie_name) {
        let conn = state.db.get()?;
        if let Err(e) = session::delete_session(&conn, token) {
            tracing::warn!("could not delete session: {}", e);
        }
    }
    Ok(redirect_with_cookie("/", session::clear_session_cookie(cookie_name)))
}

// -- Registration --

/// GET /accounts/register/
pub async fn register_page(user: MaybeUser) -> Html<RegisterTemplate> {
    Html(RegisterTemplate {
        username: user.username(),
        form: RegisterForm::default(),
        error: None,
    })
}

/// POST /accounts/register/: create the account and log it in
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    let rejected = |form: RegisterForm, msg: String| {
        (
            StatusCode::BAD_REQUEST,
            Html(RegisterTemplate {
                username: None,
                form: RegisterForm {
                    password: String::new(),
                    password_confirm: String::new(),
                    ..form
                },
                error: Some(msg),
            }),
        )
            .into_response()
    };

    if form.password != form.password_confirm {
        return Ok(rejected(form, "Die Passwörter stimmen nicht überein.".into()));
    }

    let created = {
        let conn = state.db.get()?;
        users::create(&conn, &form.username, &form.email, &form.password)
    };
    match created {
        Ok(user) => start_session(&state, user.id, "/"),
        Err(RepositoryError::Validation(msg)) => Ok(rejected(form, msg)),
        Err(RepositoryError::Conflict(_)) => Ok(rejected(
            form,
            "Dieser Benutzername ist bereits vergeben.".into(),
        )),
        Err(e) => Err(e.into()),
    }
}

// -- Profile --

/// GET /profile/
pub async fn profile_page(
    State(state): State<AppState>,
    LoginRequired(current): LoginRequired,
) -> AppResult<Html<ProfileTemplate>> {
    let conn = state.db.get()?;
    let user = users::get(&conn, current.id)?;
    Ok(Html(ProfileTemplate {
        username: Some(current.username),
        user,
        saved: false,
        error: None,
    }))
}

/// POST /profile/
pub async fn update_profile(
    State(state): State<AppState>,
    LoginRequired(current): LoginRequired,
    Form(form): Form<ProfileUpdate>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    match users::update_profile(&conn, current.id, &form) {
        Ok(user) => Ok(Html(ProfileTemplate {
            username: Some(current.username),
            user,
            saved: true,
            error: None,
        })
        .into_response()),
        Err(RepositoryError::Validation(msg)) => {
            let user = users::get(&conn, current.id)?;
            Ok((
                StatusCode::BAD_REQUEST,
                Html(ProfileTemplate {
                    username: Some(current.username),
                    user,
                    saved: false,
                    error: Some(msg),
                }),
            )
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}
