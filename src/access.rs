// Access gate and ownership checks, evaluated per request from record attributes
use url::form_urlencoded;

use crate::db::models::Document;
use crate::documents::domain::{slugify, DocumentType};
use crate::error::AppError;

pub const LOGIN_PATH: &str = "/accounts/login/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Gated,
}

impl Access {
    pub fn permits(&self, authenticated: bool) -> bool {
        match self {
            Access::Public => true,
            Access::Gated => authenticated,
        }
    }
}

/// Exams and non-public documents need a logged-in user; ownership is irrelevant.
pub fn document_access(doc: &Document) -> Access {
    if doc.public && doc.dtype != DocumentType::Exam.id() {
        Access::Public
    } else {
        Access::Gated
    }
}

/// Where a gated download sends anonymous users: back to the category listing after login.
pub fn gated_document_redirect(category_name: &str) -> String {
    login_redirect(&format!("/documents/{}/", slugify(category_name)))
}

pub fn login_redirect(next: &str) -> String {
    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    format!("{}?{}", LOGIN_PATH, query)
}

/// Only accepts a `next` target that stays on this site.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n,
        _ => "/",
    }
}

pub fn is_owner(owner: Option<i64>, user_id: i64) -> bool {
    owner == Some(user_id)
}

pub fn require_owner(owner: Option<i64>, user_id: i64) -> Result<(), AppError> {
    if is_owner(owner, user_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
