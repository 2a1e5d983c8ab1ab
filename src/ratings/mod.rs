pub mod domain;
pub mod repository;

pub use domain::{LecturerCategory, RatingError, RatingPolicy, RatingSubject, RatingSummary};
pub use repository::{RatingRepository, SqliteRatingRepository};
