pub mod domain;
pub mod repository;

pub use domain::{client_address, DedupWindow};
pub use repository::{DownloadRepository, SqliteDownloadRepository};
