use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;

/// Shared handles passed to the submission guard and the job runner.
#[derive(Clone)]
pub struct ServiceContext {
    /// User on whose behalf restores are applied.
    pub actor_id: i64,
    pub config: Arc<Config>,
    pub db: Database,
}

impl ServiceContext {
    pub fn new(config: Arc<Config>, db: Database) -> Self {
        Self {
            actor_id: config.actor_id,
            config,
            db,
        }
    }

    /// Opens the configured database and builds a context around it.
    pub fn open(config: Config) -> Result<Self, crate::db::DatabaseError> {
        let db = Database::open(&config.resolved_database_path())?;
        Ok(Self::new(Arc::new(config), db))
    }
}
