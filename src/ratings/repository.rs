// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use crate::error::RepositoryError;
use crate::ratings::domain::*;
use crate::state::DbPool;

#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// Create or overwrite the rater's score for the subject, then return the new aggregate.
    async fn upsert(
        &self,
        rater: i64,
        subject: RatingSubject,
        score: i64,
    ) -> Result<RatingSummary, RepositoryError>;

    async fn summary(&self, subject: RatingSubject) -> Result<RatingSummary, RepositoryError>;

    /// The rater's own score for the subject, if any.
    async fn rating_of(
        &self,
        rater: i64,
        subject: RatingSubject,
    ) -> Result<Option<i64>, RepositoryError>;

    /// All document scores given by the rater, keyed by document id.
    async fn document_ratings_by(&self, rater: i64) -> Result<HashMap<i64, i64>, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteRatingRepository {
    pool: DbPool,
    lecturers: RatingPolicy,
    documents: RatingPolicy,
}

impl SqliteRatingRepository {
    pub fn new(pool: DbPool, lecturers: RatingPolicy, documents: RatingPolicy) -> Self {
        Self {
            pool,
            lecturers,
            documents,
        }
    }

    fn policy_for(&self, subject: &RatingSubject) -> &RatingPolicy {
        match subject {
            RatingSubject::Lecturer { .. } => &self.lecturers,
            RatingSubject::Document { .. } => &self.documents,
        }
    }
}

/// Owner of the rated subject; NotFound if the subject doesn't exist.
fn subject_owner(conn: &Connection, subject: &RatingSubject) -> Result<Option<i64>, RepositoryError> {
    match subject {
        RatingSubject::Lecturer { id, .. } => conn
            .query_row("SELECT id FROM lecturers WHERE id = ?1", params![id], |_| Ok(None))
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("lecturer {}", id))),
        RatingSubject::Document { id } => conn
            .query_row(
                "SELECT uploader_id FROM documents WHERE id = ?1",
                params![id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("document {}", id))),
    }
}

pub fn load_summary(conn: &Connection, subject: &RatingSubject) -> Result<RatingSummary, RepositoryError> {
    let (count, sum): (i64, i64) = match subject {
        RatingSubject::Lecturer { id, category } => conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(rating), 0) FROM lecturer_ratings
             WHERE lecturer_id = ?1 AND category = ?2",
            params![id, category.tag()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?,
        RatingSubject::Document { id } => conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(rating), 0) FROM document_ratings
             WHERE document_id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?,
    };
    Ok(RatingSummary::from_totals(subject.category_tag(), count, sum))
}

#[async_trait]
impl RatingRepository for SqliteRatingRepository {
    async fn upsert(
        &self,
        rater: i64,
        subject: RatingSubject,
        score: i64,
    ) -> Result<RatingSummary, RepositoryError> {
        let conn = self.pool.get()?;

        let owner = subject_owner(&conn, &subject)?;
        let score = self
            .policy_for(&subject)
            .validate(score, rater, owner)
            .map_err(|e| RepositoryError::Validation(e.to_string()))?;

        // Single-statement upsert; the UNIQUE constraint is the conflict target
        match subject {
            RatingSubject::Lecturer { id, category } => conn.execute(
                "INSERT INTO lecturer_ratings (user_id, lecturer_id, category, rating)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, lecturer_id, category) DO UPDATE SET
                   rating = excluded.rating",
                params![rater, id, category.tag(), score],
            )?,
            RatingSubject::Document { id } => conn.execute(
                "INSERT INTO document_ratings (user_id, document_id, rating)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, document_id) DO UPDATE SET
                   rating = excluded.rating",
                params![rater, id, score],
            )?,
        };

        tracing::debug!(rater, ?subject, score, "rating stored");
        load_summary(&conn, &subject)
    }

    async fn summary(&self, subject: RatingSubject) -> Result<RatingSummary, RepositoryError> {
        let conn = self.pool.get()?;
        load_summary(&conn, &subject)
    }

    async fn rating_of(
        &self,
        rater: i64,
        subject: RatingSubject,
    ) -> Result<Option<i64>, RepositoryError> {
        let conn = self.pool.get()?;
        let score = match subject {
            RatingSubject::Lecturer { id, category } => conn
                .query_row(
                    "SELECT rating FROM lecturer_ratings
                     WHERE user_id = ?1 AND lecturer_id = ?2 AND category = ?3",
                    params![rater, id, category.tag()],
                    |row| row.get(0),
                )
                .optional()?,
            RatingSubject::Document { id } => conn
                .query_row(
                    "SELECT rating FROM document_ratings WHERE user_id = ?1 AND document_id = ?2",
                    params![rater, id],
                    |row| row.get(0),
                )
                .optional()?,
        };
        Ok(score)
    }

    async fn document_ratings_by(&self, rater: i64) -> Result<HashMap<i64, i64>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT document_id, rating FROM document_ratings WHERE user_id = ?1")?;
        let ratings = stmt
            .query_map(params![rater], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<HashMap<i64, i64>, _>>()?;
        Ok(ratings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn seeded_repo() -> (DbPool, SqliteRatingRepository) {
        let pool = db::memory_pool().unwrap();
        {
            let conn = pool.get().unwrap();
            conn.execute_batch(
                "INSERT INTO users (id, username) VALUES (1, 'r1'), (2, 'r2'), (3, 'uploader');
                 INSERT INTO lecturers (id, last_name, first_name, abbreviation)
                     VALUES (10, 'Muster', 'Hans', 'HM');
                 INSERT INTO document_categories (id, name, description) VALUES (1, 'Prog3', 'Programmieren 3');
                 INSERT INTO documents (id, name, category_id, dtype, file_path, uploader_id)
                     VALUES (20, 'Summary', 1, 1, 'documents/prog3/a.pdf', 3);",
            )
            .unwrap();
        }
        let repo = SqliteRatingRepository::new(
            pool.clone(),
            RatingPolicy {
                min: 1,
                max: 10,
                forbid_self_rating: false,
            },
            RatingPolicy {
                min: 1,
                max: 5,
                forbid_self_rating: true,
            },
        );
        (pool, repo)
    }

    fn didactic(id: i64) -> RatingSubject {
        RatingSubject::Lecturer {
            id,
            category: LecturerCategory::Didactic,
        }
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_row_with_latest_score() {
        let (pool, repo) = seeded_repo();

        repo.upsert(1, didactic(10), 5).await.unwrap();
        let summary = repo.upsert(1, didactic(10), 8).await.unwrap();

        assert_eq!(summary.rating_count, 1);
        assert_eq!(summary.rating_avg, 8);
        assert_eq!(summary.category.as_deref(), Some("d"));

        let conn = pool.get().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM lecturer_ratings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn second_rater_moves_the_average() {
        let (_pool, repo) = seeded_repo();

        repo.upsert(1, didactic(10), 5).await.unwrap();
        repo.upsert(1, didactic(10), 8).await.unwrap();
        let summary = repo.upsert(2, didactic(10), 10).await.unwrap();

        assert_eq!(summary.rating_count, 2);
        assert_eq!(summary.rating_exact, 9.0);
        assert_eq!(summary.rating_avg, 9);
    }

    #[tokio::test]
    async fn categories_are_aggregated_separately() {
        let (_pool, repo) = seeded_repo();
        let human = RatingSubject::Lecturer {
            id: 10,
            category: LecturerCategory::Human,
        };

        repo.upsert(1, didactic(10), 2).await.unwrap();
        repo.upsert(1, human, 9).await.unwrap();

        assert_eq!(repo.summary(didactic(10)).await.unwrap().rating_avg, 2);
        assert_eq!(repo.summary(human).await.unwrap().rating_avg, 9);
        let technical = RatingSubject::Lecturer {
            id: 10,
            category: LecturerCategory::Technical,
        };
        assert_eq!(repo.summary(technical).await.unwrap().rating_count, 0);
    }

    #[tokio::test]
    async fn out_of_range_score_is_a_validation_error() {
        let (_pool, repo) = seeded_repo();
        let err = repo.upsert(1, didactic(10), 11).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));

        let err = repo
            .upsert(1, RatingSubject::Document { id: 20 }, 6)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
    }

    #[tokio::test]
    async fn uploader_cannot_rate_own_document() {
        let (_pool, repo) = seeded_repo();
        let err = repo
            .upsert(3, RatingSubject::Document { id: 20 }, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));

        let summary = repo
            .upsert(1, RatingSubject::Document { id: 20 }, 4)
            .await
            .unwrap();
        assert_eq!(summary.rating_count, 1);
        assert_eq!(summary.category, None);
    }

    #[tokio::test]
    async fn unknown_subject_is_not_found() {
        let (_pool, repo) = seeded_repo();
        let err = repo.upsert(1, didactic(999), 5).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn plain_duplicate_insert_is_rejected_by_storage() {
        let (pool, repo) = seeded_repo();
        repo.upsert(1, didactic(10), 5).await.unwrap();

        let conn = pool.get().unwrap();
        let err = conn
            .execute(
                "INSERT INTO lecturer_ratings (user_id, lecturer_id, category, rating)
                 VALUES (1, 10, 'd', 3)",
                [],
            )
            .unwrap_err();
        assert!(matches!(
            RepositoryError::from(err),
            RepositoryError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn own_ratings_are_reported() {
        let (_pool, repo) = seeded_repo();
        assert_eq!(repo.rating_of(1, didactic(10)).await.unwrap(), None);
        repo.upsert(1, didactic(10), 7).await.unwrap();
        repo.upsert(1, RatingSubject::Document { id: 20 }, 2)
            .await
            .unwrap();
        assert_eq!(repo.rating_of(1, didactic(10)).await.unwrap(), Some(7));
        let docs = repo.document_ratings_by(1).await.unwrap();
        assert_eq!(docs.get(&20), Some(&2));
    }
}
