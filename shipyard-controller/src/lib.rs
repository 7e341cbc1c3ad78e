//! Shipyard Controller
//!
//! Lifecycle controller and status reconciler for build and deployment jobs.
//!
//! Architecture:
//! - Configuration: settings from environment or defaults
//! - Repository: `JobStore` with Postgres and in-memory implementations
//! - Service: `JobController`, the only writer of lifecycle fields
//! - Backend: read-only view of the Kubernetes Jobs doing the work
//! - Reconcile: periodic sweep folding backend status into job records

pub mod backend;
pub mod config;
pub mod db;
pub mod reconcile;
pub mod repository;
pub mod service;
