//! # TaskRelay Scheduler
//!
//! Task store and dispatch worker.
//!
//! ## Architecture
//! ```text
//! DispatchWorker (tokio interval)
//!   ├── TaskDb::due_tasks(now, registered types, batch)
//!   ├── HandlerRegistry: TaskType → TaskHandler
//!   │     ├── sms / call / whatsapp → MessageHandler → MessageChannel
//!   │     ├── email                 → EmailHandler   → Mailer
//!   │     ├── calendar_event        → GoogleEventHandler  ─┐
//!   │     └── outlook_event         → OutlookEventHandler ─┴→ events (confirmation fan-out)
//!   └── TaskDb::mark(id, done | failed)
//! ```

pub mod engine;
pub mod events;
pub mod handlers;
pub mod persistence;
pub mod registry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{CycleReport, DispatchWorker};
pub use events::FanoutReport;
pub use persistence::TaskDb;
pub use registry::{HandlerRegistry, TaskHandler};
