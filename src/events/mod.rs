pub mod ical;
pub mod repository;
pub mod schedule;

pub use repository::{EventFields, EventView};
pub use schedule::Schedule;
