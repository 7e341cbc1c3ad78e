//! Data Transfer Objects
//!
//! Read-side summaries of job records, used in log lines and listings.

pub mod job;
