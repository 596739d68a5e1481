//! Meetgate — qualification and scheduled-action engine for inbound sales
//! meetings.
//!
//! New calendar events flow through the qualification controller, which runs
//! the rule evaluator and moves each meeting through its lifecycle. Status
//! transitions enqueue idempotent side-effect intents (emails, calendar
//! cleanup) on a durable job queue; a one-minute ticker claims due jobs and
//! executes them with retry and backoff. A weekly rollup condenses outcomes
//! into per-user efficiency metrics.

pub mod config;
pub mod db;
mod emails;
pub mod error;
pub mod evaluator;
pub mod jobs;
pub mod metrics;
mod migrations;
pub mod providers;
pub mod qualify;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod types;

pub use error::EngineError;
pub use state::EngineState;
