//! Configuration and dependency initialization.

pub mod collaborators;
mod dependencies;
pub mod settings;

pub use collaborators::{
    IndexBaseRegistry, PipelineConfigSource, StaticIndexBaseRegistry, StaticPipelineSource,
};
pub use dependencies::{Dependencies, WorkerOrchestrator};
pub use settings::{ConnectionMode, WorkerSettings};
