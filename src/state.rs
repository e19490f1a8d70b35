use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::forum::{DynForumRepository, SqliteForumRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub repo: DynForumRepository,
    pub config: Config,
}

impl AppState {
    /// State backed by the SQLite repository over `pool`.
    pub fn new(pool: DbPool, config: Config) -> Self {
        Self {
            repo: Arc::new(SqliteForumRepository::new(pool)),
            config,
        }
    }
}
