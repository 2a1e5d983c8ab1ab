pub mod api;
pub mod assets;
pub mod auth;
pub mod documents;
pub mod events;
pub mod home;
pub mod lecturers;
pub mod quotes;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application router with state applied.
pub fn app(state: AppState) -> Router {
    // Multipart framing on top of the largest accepted file
    let body_limit = state.config.storage.max_upload_bytes + 1024 * 1024;

    Router::new()
        .route("/", get(home::index))
        .route("/assets/{*path}", get(assets::serve))
        .merge(auth::router())
        .merge(users::router())
        .merge(lecturers::router())
        .merge(quotes::router())
        .merge(documents::router())
        .merge(events::router())
        .route("/api/v1/", get(api::root))
        .nest("/api/v1", api::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Form inputs arrive as strings; blank means absent.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// HTML checkboxes are only submitted when ticked.
pub(crate) fn checkbox(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("on" | "true" | "1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_inputs_are_none() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" x ")), Some("x".to_string()));
    }

    #[test]
    fn checkbox_values() {
        assert!(checkbox(Some("on")));
        assert!(!checkbox(None));
        assert!(!checkbox(Some("off")));
    }
}
