pub mod quotes;
pub mod repository;

pub use quotes::{Page, QuoteView, QUOTES_PER_PAGE};
pub use repository::{LecturerListing, LecturerRecord};
