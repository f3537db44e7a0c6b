//! Application state shared across handlers.

use crate::db::DbPools;

/// Shared application state. Cheap to clone; the pools are handles.
#[derive(Clone)]
pub struct AppState {
    pools: DbPools,
}

impl AppState {
    pub fn new(pools: DbPools) -> Self {
        Self { pools }
    }

    pub fn pools(&self) -> &DbPools {
        &self.pools
    }
}
