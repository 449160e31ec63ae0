//! # TaskRelay Gateway
//!
//! Axum HTTP API: task intake and lookup, plus passthrough routes for
//! Google Calendar and Outlook. Intake only persists; delivery is the
//! dispatch worker's job.

pub mod calendar;
pub mod error;
pub mod outlook;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, build_router, start};
