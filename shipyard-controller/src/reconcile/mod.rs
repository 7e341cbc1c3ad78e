//! Reconciliation layer
//!
//! Bridges the execution backend's loosely consistent status signal and the
//! authoritative job records.

pub mod reconciler;

pub use reconciler::{ReconcileError, ReconcileReport, Reconciled, Reconciler};
