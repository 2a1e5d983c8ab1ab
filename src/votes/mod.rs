pub mod domain;
pub mod repository;

pub use domain::{VoteAction, VoteOutcome, VoteTally};
pub use repository::{SqliteVoteRepository, VoteRepository};
