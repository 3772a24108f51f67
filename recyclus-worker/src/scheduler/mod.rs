//! Scheduler layer for the worker
//!
//! This layer starts the worker units and drives each one through its
//! claim-to-done loop.

pub mod pool;

pub use pool::WorkerPool;
