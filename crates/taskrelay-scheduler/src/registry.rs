//! Task handlers, keyed by task type.
//!
//! The worker never branches on `TaskType`; it asks the registry. A type
//! with no registered handler is simply never selected from the store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use taskrelay_core::error::Result;
use taskrelay_core::task::{Task, TaskType};
use taskrelay_core::traits::Providers;

use crate::handlers::{EmailHandler, GoogleEventHandler, MessageHandler, OutlookEventHandler};

/// Executes one due task. `Ok` marks it done, `Err` marks it failed.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, task: &Task) -> Result<()>;
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `task_type`.
    pub fn register(&mut self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type, handler);
    }

    pub fn get(&self, task_type: TaskType) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(&task_type)
    }

    /// Registered types, in declaration order.
    pub fn types(&self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|t| self.handlers.contains_key(t))
            .collect()
    }

    /// Types with no handler; their tasks stay pending.
    pub fn missing(&self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|t| !self.handlers.contains_key(t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Wire a handler for every task type the configured providers can serve.
    pub fn from_providers(providers: &Providers) -> Self {
        let mut registry = Self::new();
        if let Some(sms) = &providers.sms {
            registry.register(TaskType::Sms, Arc::new(MessageHandler::new(sms.clone())));
        }
        if let Some(voice) = &providers.voice {
            registry.register(TaskType::Call, Arc::new(MessageHandler::new(voice.clone())));
        }
        if let Some(whatsapp) = &providers.whatsapp {
            registry.register(TaskType::Whatsapp, Arc::new(MessageHandler::new(whatsapp.clone())));
        }
        if let Some(mailer) = &providers.mailer {
            registry.register(TaskType::Email, Arc::new(EmailHandler::new(mailer.clone())));
        }
        if let Some(google) = &providers.google {
            registry.register(
                TaskType::CalendarEvent,
                Arc::new(GoogleEventHandler::new(google.clone(), providers.mailer.clone())),
            );
        }
        if let Some(outlook) = &providers.outlook {
            registry.register(
                TaskType::OutlookEvent,
                Arc::new(OutlookEventHandler::new(outlook.clone(), providers.mailer.clone())),
            );
        }
        registry
    }
}
