//! Core types, validation, and limits for the edge analytics ingestion engine.

pub mod error;
pub mod events;
pub mod limits;

pub use error::{Error, Result, ValidationErrorCode};
pub use events::*;
