//! Database models for GoTasker.

pub mod task;

pub use task::{NewTask, Task, TaskUpdate};
