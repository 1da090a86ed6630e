// Domain services composed from repositories and the object store

pub mod concepts;
pub mod tasks;

pub use concepts::ConceptService;
pub use tasks::{StaleTaskSweeper, TaskService, STALE_TASK_MESSAGE};
