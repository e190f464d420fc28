use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    config::Config,
    db::{InMemoryRecordStore, RecordStore},
    services::{strategy, MatrixService},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The process-wide rating matrix
    pub matrix: Arc<MatrixService>,
    /// Durable store the matrix is derived from
    pub records: Arc<dyn RecordStore>,
    /// Page size used when a request omits `limit`
    pub default_page_size: usize,
    /// Held across persisting a review and applying it to the matrix, so both
    /// see concurrent writes for the same pair in the same order
    pub review_writes: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(matrix: Arc<MatrixService>, records: Arc<dyn RecordStore>, default_page_size: usize) -> Self {
        Self {
            matrix,
            records,
            default_page_size,
            review_writes: Arc::new(Mutex::new(())),
        }
    }

    /// State wired to an empty in-memory record store, not yet bootstrapped
    pub fn in_memory(config: &Config) -> Self {
        let matrix = Arc::new(MatrixService::new(strategy::from_config(config)));
        Self::new(
            matrix,
            Arc::new(InMemoryRecordStore::new()),
            config.default_page_size,
        )
    }
}
