//! HTTP handlers for the vision service.

pub mod health;
pub mod metrics;
pub mod vision;
