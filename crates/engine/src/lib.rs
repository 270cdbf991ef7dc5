//! `engine` crate — domain models, DAG validation, template resolution,
//! the progress bus, and the execution scheduler.

pub mod dag;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod progress;
pub mod scheduler;
pub mod store;
pub mod template;

pub use dispatch::{DispatchError, NodeDispatcher};
pub use error::EngineError;
pub use models::{
    Context, Credential, Edge, Execution, ExecutionProgress, ExecutionStatus, Node, NodeKind,
    NodeProgress, NodeRunStatus, Workflow,
};
pub use progress::ProgressBus;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use store::{CredentialUpdate, ExecutionUpdate, MemoryStore, Store, StoreError};
