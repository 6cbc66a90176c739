// ABOUTME: Library root for deckhand - exposes the orchestration engine for testing.
// ABOUTME: The main binary is in main.rs.

pub mod certs;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod output;
pub mod plan;
pub mod preflight;
pub mod runner;
pub mod tools;
pub mod types;
