//! Core data model.

pub mod job;
