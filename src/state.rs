use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;

pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> SharedState {
        Arc::new(Self { pool, config })
    }
}
