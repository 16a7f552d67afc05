//! Core library for the campus leave & substitution portal backend.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
