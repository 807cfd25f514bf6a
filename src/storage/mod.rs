//! Metric stores
//!
//! Two interchangeable backends behind the `StorageEngine` trait:
//!
//! - **Memory**: mutex-guarded maps, optionally snapshotted to a JSON file
//!   on a timer or after every write
//! - **SQLite** (feature `storage-sqlite`): one table per metric kind,
//!   upserts, transactional batches, retried on transient failures
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use metrics_relay::storage::{StorageEngine, memory::MemoryStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store: Arc<dyn StorageEngine> = Arc::new(MemoryStore::new());
//! store.save_counter("PollCount", 1).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{MetricSnapshot, StorageEngine};
pub use error::{StorageError, StorageResult};
