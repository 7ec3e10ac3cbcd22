//! Datashare API Library
//!
//! This crate provides the HTTP API handlers and application setup for the
//! dataset download and storage-administration service.

mod api_doc;
pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;

pub use error::ErrorResponse;
pub use state::AppState;
