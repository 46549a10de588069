//! vision-service: relays text and image prompts to Gemini while keeping a
//! per-user conversation history in memory.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
