// Document domain - types, licenses and file naming, no storage
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocumentType {
    Summary = 1,
    Exam = 2,
    Software = 3,
    LearningAid = 4,
    Attestation = 5,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Summary,
        DocumentType::Exam,
        DocumentType::Software,
        DocumentType::LearningAid,
        DocumentType::Attestation,
    ];

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    pub fn id(&self) -> i64 {
        *self as i64
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Summary => "Zusammenfassung",
            DocumentType::Exam => "Prüfung",
            DocumentType::Software => "Software",
            DocumentType::LearningAid => "Lernhilfe",
            DocumentType::Attestation => "Testat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum License {
    PublicDomain = 1,
    CcBy = 2,
    CcBySa = 3,
    CcByNc = 4,
    CcByNcSa = 5,
}

/// Display name plus deed and badge URLs for a license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseDetails {
    pub name: &'static str,
    pub url: String,
    pub icon: String,
}

impl License {
    pub const ALL: [License; 5] = [
        License::PublicDomain,
        License::CcBy,
        License::CcBySa,
        License::CcByNc,
        License::CcByNcSa,
    ];

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.id() == id)
    }

    pub fn id(&self) -> i64 {
        *self as i64
    }

    pub fn name(&self) -> &'static str {
        match self {
            License::PublicDomain => "Public Domain",
            License::CcBy => "CC BY 3.0",
            License::CcBySa => "CC BY-SA 3.0",
            License::CcByNc => "CC BY-NC 3.0",
            License::CcByNcSa => "CC BY-NC-SA 3.0",
        }
    }

    fn cc_code(&self) -> Option<&'static str> {
        match self {
            License::PublicDomain => None,
            License::CcBy => Some("by"),
            License::CcBySa => Some("by-sa"),
            License::CcByNc => Some("by-nc"),
            License::CcByNcSa => Some("by-nc-sa"),
        }
    }

    pub fn details(&self) -> LicenseDetails {
        match self.cc_code() {
            Some(code) => LicenseDetails {
                name: self.name(),
                url: format!("http://creativecommons.org/licenses/{}/3.0/deed.de", code),
                icon: format!("http://i.creativecommons.org/l/{}/3.0/80x15.png", code),
            },
            None => LicenseDetails {
                name: self.name(),
                url: "http://creativecommons.org/publicdomain/zero/1.0/deed.de".to_string(),
                icon: "http://i.creativecommons.org/p/zero/1.0/80x15.png".to_string(),
            },
        }
    }
}

/// Form-level checks shared by upload and edit.
pub fn validate_metadata(name: &str, dtype: i64, license: Option<i64>, public: bool) -> Result<DocumentType, String> {
    if name.trim().is_empty() {
        return Err("Titel darf nicht leer sein.".to_string());
    }
    if name.chars().count() > 100 {
        return Err("Titel darf höchstens 100 Zeichen lang sein.".to_string());
    }
    let dtype = DocumentType::from_id(dtype).ok_or_else(|| format!("Unbekannter Typ {}", dtype))?;
    if let Some(id) = license {
        License::from_id(id).ok_or_else(|| format!("Unbekannte Lizenz {}", id))?;
    }
    if dtype == DocumentType::Exam && public {
        return Err("Prüfungen dürfen nicht öffentlich sein.".to_string());
    }
    Ok(dtype)
}

/// Lowercase ASCII slug: accents folded, runs of spaces/hyphens collapsed.
pub fn slugify(value: &str) -> String {
    let folded = ascii_fold(value);
    let kept: String = folded
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    kept.trim()
        .to_lowercase()
        .split(|c: char| c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Category names are used verbatim in URLs.
pub fn is_valid_category_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// NFKD-decompose and drop everything outside ASCII ("Übung.pdf" -> "Ubung.pdf").
pub fn ascii_fold(value: &str) -> String {
    value.nfkd().filter(char::is_ascii).collect()
}

pub fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

pub fn is_pdf(path: &str) -> bool {
    extension(path).eq_ignore_ascii_case(".pdf")
}

pub fn is_github(url: Option<&str>) -> bool {
    url.is_some_and(|u| u.contains("github"))
}

/// Storage path relative to the upload root: `documents/<slug>/<timestamp><ext>`.
pub fn storage_path(category_name: &str, original_filename: &str, at: DateTime<Utc>) -> String {
    format!(
        "documents/{}/{}{}",
        slugify(category_name),
        at.format("%Y-%m-%d_%H-%M-%S"),
        extension(original_filename)
    )
}

/// `Content-Disposition` for serving a stored document: PDFs open inline.
pub fn content_disposition(original_filename: &str) -> String {
    let filename = ascii_fold(original_filename).replace(['"', '\\'], "");
    let kind = if filename.to_lowercase().ends_with(".pdf") {
        "inline"
    } else {
        "attachment"
    };
    format!("{}; filename=\"{}\"", kind, filename)
}
