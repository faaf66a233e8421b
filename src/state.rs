use std::sync::Arc;

use crate::cache::CacheContext;
use crate::db::DbPair;
use crate::services::StatsService;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPair>,
    pub cache: Arc<CacheContext>,
    pub stats: Arc<StatsService>,
}
