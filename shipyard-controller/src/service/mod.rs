//! Service Module
//!
//! Business logic layer for the controller.

pub mod job;

pub use job::{ControllerError, JobController, TransitionPolicy};
