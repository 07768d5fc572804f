//! Shared helpers for the end-to-end test suites.

pub mod fixtures;
pub mod mocks;
pub mod setup;
