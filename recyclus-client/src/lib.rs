//! Recyclus service clients
//!
//! Clients for the two services every worker shares:
//! - the job store, where jobs are queued and their state is kept
//! - the artifact store, which receives the files a task produced
//!
//! # Example
//!
//! ```no_run
//! use recyclus_client::{ArtifactClient, JobStore, RedisStore};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = RedisStore::connect("redis://redis/0", Duration::from_secs(5)).await?;
//!     let key = store.claim().await?;
//!     let job = store.load_job(&key).await?;
//!
//!     let artifacts = ArtifactClient::new("http://datastore:5020/api/internal/store");
//!     println!("claimed {} for {} ({})", key, job.user, artifacts.endpoint());
//!     Ok(())
//! }
//! ```

pub mod artifacts;
pub mod error;
pub mod store;

// Re-export commonly used types
pub use artifacts::{ArtifactClient, UploadReceipt};
pub use error::{StoreError, StoreResult, UploadError};
pub use store::{JobStore, MemoryStore, Queue, RedisStore, task_status_key};
