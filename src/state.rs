use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::documents::storage::FileStore;
use crate::downloads::{DedupWindow, DownloadRepository, SqliteDownloadRepository};
use crate::ratings::{RatingRepository, SqliteRatingRepository};
use crate::votes::{SqliteVoteRepository, VoteRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub files: FileStore,
    pub ratings: Arc<dyn RatingRepository>,
    pub votes: Arc<dyn VoteRepository>,
    pub downloads: Arc<dyn DownloadRepository>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let ratings = SqliteRatingRepository::new(
            db.clone(),
            config.ratings.lecturers.into(),
            config.ratings.documents.into(),
        );
        let votes = SqliteVoteRepository::new(db.clone());
        let downloads = SqliteDownloadRepository::new(
            db.clone(),
            DedupWindow::hours(config.downloads.dedup_window_hours),
        );
        Self {
            files: FileStore::new(config.uploads_path()),
            ratings: Arc::new(ratings),
            votes: Arc::new(votes),
            downloads: Arc::new(downloads),
            db,
            config,
        }
    }
}
