//! Explicit labeler library - shared modules for the CLI and the scheduler.

pub mod catalog;
pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod models;
pub mod mutation;
pub mod normalize;
pub mod pacing;
pub mod progress;
pub mod schedule;
pub mod store;
