//! Core domain types
//!
//! These types represent the job records tracked by the control plane and are
//! shared between the controller (persists and transitions them) and any
//! scheduler or API process that reads them.

pub mod execution;
pub mod job;
