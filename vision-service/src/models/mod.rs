//! Domain models for the vision service.

pub mod conversation;

pub use conversation::{Part, Role, Turn};
