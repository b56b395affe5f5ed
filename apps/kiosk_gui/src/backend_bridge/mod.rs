//! Worker-thread bridge between the egui frontend and the tokio backend.

pub mod commands;
pub mod runtime;
