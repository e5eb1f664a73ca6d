//! Tribunal: a branch-scoped review orchestrator.
//!
//! A review run moves a target branch through
//! `init -> explore -> plan -> run -> ingest -> verdict -> merge`, with every
//! artifact kept under `.tribunal/` and guarded against drift between the
//! plan and the submissions it was made for.

pub mod classify;
pub mod config;
pub mod digest;
pub mod drift;
pub mod errors;
pub mod layout;
pub mod orchestrator;
pub mod plan;
pub mod review;
pub mod store;
pub mod tribunal_config;
pub mod ui;
pub mod util;
pub mod vcs;
