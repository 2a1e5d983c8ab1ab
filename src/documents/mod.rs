pub mod domain;
pub mod repository;
pub mod storage;

pub use domain::{DocumentType, License};
pub use repository::{CategoryListing, DocumentFields, DocumentView, StoredFile};
