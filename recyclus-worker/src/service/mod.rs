//! Service layer
//!
//! Services contain the job lifecycle logic of the worker: supervising task
//! processes, sequencing a job's tasks, and shipping their artifacts.
//!
//! Collaborators sit behind traits (`CancelCheck`, `ProcessHandle`,
//! `ArtifactUploader`) so the lifecycle can be tested without real services.

pub mod pipeline;
pub mod supervisor;
pub mod upload;

// Re-export what the binary wires together
pub use pipeline::{PipelineSettings, TaskPipeline};
pub use upload::ArtifactUploader;
