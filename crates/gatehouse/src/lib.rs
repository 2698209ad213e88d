//! Session-driven applicant intake for community whitelisting: a timed
//! questionnaire collected over a chat channel, a staff review hand-off, and
//! an approve/reject decision flow with durable-write retry.
//!
//! The chat platform itself is reached only through the traits in
//! [`workflows::intake::gateway`]; adapters for a concrete client live
//! outside this crate.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
