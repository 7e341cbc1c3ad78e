//! Shipyard Core
//!
//! Core types for the Shipyard build/deployment job lifecycle.
//!
//! This crate contains:
//! - Domain types: job records, their lifecycle status and the execution
//!   backend's status vocabulary
//! - DTOs: compact read-side summaries of job records

pub mod domain;
pub mod dto;
