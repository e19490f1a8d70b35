pub mod domain;
pub mod repository;

pub use domain::{VoteOutcome, VoteState, VoteValue};
pub use repository::{DynForumRepository, ForumRepository, PostFilter, SqliteForumRepository};
