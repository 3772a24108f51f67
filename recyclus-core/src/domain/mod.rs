//! Core domain types
//!
//! These types describe a simulation job as it is stored in the shared job
//! store and as the worker executes it. They carry no I/O of their own.

pub mod job;
pub mod outcome;
pub mod role;
pub mod task;
