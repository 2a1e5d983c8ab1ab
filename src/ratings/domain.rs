// Rating domain - pure types and rules, no storage
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::RatingPolicyConfig;

/// The three axes a lecturer is rated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LecturerCategory {
    #[serde(rename = "d")]
    Didactic,
    #[serde(rename = "m")]
    Human,
    #[serde(rename = "f")]
    Technical,
}

impl LecturerCategory {
    pub const ALL: [LecturerCategory; 3] = [
        LecturerCategory::Didactic,
        LecturerCategory::Human,
        LecturerCategory::Technical,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            LecturerCategory::Didactic => "d",
            LecturerCategory::Human => "m",
            LecturerCategory::Technical => "f",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LecturerCategory::Didactic => "Didaktisch",
            LecturerCategory::Human => "Menschlich",
            LecturerCategory::Technical => "Fachlich",
        }
    }
}

impl FromStr for LecturerCategory {
    type Err = RatingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "d" => Ok(LecturerCategory::Didactic),
            "m" => Ok(LecturerCategory::Human),
            "f" => Ok(LecturerCategory::Technical),
            other => Err(RatingError::InvalidCategory(other.to_string())),
        }
    }
}

impl fmt::Display for LecturerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What is being rated. Lecturer ratings are scoped by category, document
/// ratings have a single implicit one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingSubject {
    Lecturer {
        id: i64,
        category: LecturerCategory,
    },
    Document {
        id: i64,
    },
}

impl RatingSubject {
    pub fn category_tag(&self) -> Option<&'static str> {
        match self {
            RatingSubject::Lecturer { category, .. } => Some(category.tag()),
            RatingSubject::Document { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatingError {
    #[error("unknown rating category '{0}'")]
    InvalidCategory(String),

    #[error("score {score} outside {min}..={max}")]
    ScoreOutOfRange { score: i64, min: u8, max: u8 },

    #[error("a user cannot rate their own uploads")]
    SelfRating,
}

/// Per-entity rating rules: closed score range and the self-rating ban.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingPolicy {
    pub min: u8,
    pub max: u8,
    pub forbid_self_rating: bool,
}

impl From<RatingPolicyConfig> for RatingPolicy {
    fn from(c: RatingPolicyConfig) -> Self {
        Self {
            min: c.min,
            max: c.max,
            forbid_self_rating: c.forbid_self_rating,
        }
    }
}

impl RatingPolicy {
    /// Check a score from `rater` against a subject owned by `owner`.
    pub fn validate(&self, score: i64, rater: i64, owner: Option<i64>) -> Result<i64, RatingError> {
        if score < i64::from(self.min) || score > i64::from(self.max) {
            return Err(RatingError::ScoreOutOfRange {
                score,
                min: self.min,
                max: self.max,
            });
        }
        if self.forbid_self_rating && owner == Some(rater) {
            return Err(RatingError::SelfRating);
        }
        Ok(score)
    }
}

/// Aggregate over all ratings of one (subject, category).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub rating_count: i64,
    pub rating_avg: i64,
    pub rating_exact: f64,
}

impl RatingSummary {
    pub fn from_totals(category: Option<&str>, count: i64, sum: i64) -> Self {
        let rating_exact = if count > 0 {
            sum as f64 / count as f64
        } else {
            0.0
        };
        Self {
            category: category.map(str::to_string),
            rating_count: count,
            rating_avg: round_rating(rating_exact),
            rating_exact,
        }
    }
}

/// Nearest integer, ties away from zero (8.5 -> 9).
pub fn round_rating(exact: f64) -> i64 {
    exact.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(min: u8, max: u8, forbid_self_rating: bool) -> RatingPolicy {
        RatingPolicy {
            min,
            max,
            forbid_self_rating,
        }
    }

    #[test]
    fn category_tags_parse() {
        assert_eq!("d".parse::<LecturerCategory>(), Ok(LecturerCategory::Didactic));
        assert_eq!("m".parse::<LecturerCategory>(), Ok(LecturerCategory::Human));
        assert_eq!("f".parse::<LecturerCategory>(), Ok(LecturerCategory::Technical));
        assert!(matches!(
            "x".parse::<LecturerCategory>(),
            Err(RatingError::InvalidCategory(_))
        ));
    }

    #[test]
    fn score_range_is_closed() {
        let p = policy(1, 5, false);
        assert_eq!(p.validate(1, 1, None), Ok(1));
        assert_eq!(p.validate(5, 1, None), Ok(5));
        assert!(p.validate(0, 1, None).is_err());
        assert!(p.validate(6, 1, None).is_err());
    }

    #[test]
    fn self_rating_only_rejected_when_policy_forbids_it() {
        assert_eq!(
            policy(1, 5, true).validate(3, 7, Some(7)),
            Err(RatingError::SelfRating)
        );
        assert_eq!(policy(1, 5, true).validate(3, 7, Some(8)), Ok(3));
        assert_eq!(policy(1, 5, true).validate(3, 7, None), Ok(3));
        assert_eq!(policy(1, 5, false).validate(3, 7, Some(7)), Ok(3));
    }

    #[test]
    fn empty_summary_is_zero() {
        let s = RatingSummary::from_totals(Some("d"), 0, 0);
        assert_eq!(s.rating_count, 0);
        assert_eq!(s.rating_avg, 0);
        assert_eq!(s.rating_exact, 0.0);
    }

    #[test]
    fn ties_round_away_from_zero() {
        assert_eq!(RatingSummary::from_totals(None, 2, 17).rating_avg, 9);
        assert_eq!(RatingSummary::from_totals(None, 2, 5).rating_avg, 3);
        assert_eq!(RatingSummary::from_totals(None, 3, 10).rating_avg, 3);
        assert_eq!(RatingSummary::from_totals(None, 2, 17).rating_exact, 8.5);
    }

    #[test]
    fn document_summary_omits_category() {
        let json = serde_json::to_value(RatingSummary::from_totals(None, 1, 4)).unwrap();
        assert!(json.get("category").is_none());
        assert_eq!(json["rating_avg"], 4);
    }
}
