//! # TaskRelay Core
//!
//! Shared building blocks for the relay service:
//! - `task` / `payload` — the persisted task model and its typed `extra_data`
//! - `calendar` — provider-neutral event descriptions handed to calendar adapters
//! - `traits` — adapter seams (`MessageChannel`, `Mailer`, `GoogleCalendar`, `OutlookCalendar`)
//! - `config` — TOML + environment configuration
//! - `error` — the crate-wide `RelayError`

pub mod calendar;
pub mod config;
pub mod error;
pub mod payload;
pub mod task;
pub mod time;
pub mod traits;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use payload::TaskPayload;
pub use task::{NewTask, Task, TaskStatus, TaskType};
pub use traits::Providers;
