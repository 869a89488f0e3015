//! # disco-rs
//!
//! Weekly approval workflows that survive restarts.
//!
//! Each workflow is a state machine run by a single-writer engine: it sleeps
//! on one alarm, sends mail through an outbox, accepts typed commands and raw
//! messages idempotently, and persists a snapshot after every change so a
//! restart resumes where it left off (or starts a fresh cycle when the
//! stored one is stale).

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod mail;
pub mod store;
pub mod telemetry;
pub mod workflows;
