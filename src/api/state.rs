//! Shared state passed to all API handlers

use std::sync::Arc;

use crate::storage::StorageEngine;

#[derive(Clone)]
pub struct ApiState {
    /// Metric store every handler reads from and writes to
    pub storage: Arc<dyn StorageEngine>,
}

impl ApiState {
    pub fn new(storage: Arc<dyn StorageEngine>) -> Self {
        Self { storage }
    }
}
