//! Notifications emitted to the viewer: completion toasts, denied navigation
//! and per-step playback failures.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::StepId;

/// Event raised by the ledger or controller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerEvent {
    /// A step was completed for the first time
    StepCompleted { step_id: StepId },
    /// Navigation to a locked step was rejected
    AccessDenied { step_id: StepId },
    /// The step cannot be played (unsupported source or transport failure)
    PlaybackUnavailable { step_id: StepId, reason: String },
}

impl ViewerEvent {
    pub fn step_id(&self) -> &StepId {
        match self {
            ViewerEvent::StepCompleted { step_id }
            | ViewerEvent::AccessDenied { step_id }
            | ViewerEvent::PlaybackUnavailable { step_id, .. } => step_id,
        }
    }
}

type EventHandler = Arc<dyn Fn(&ViewerEvent) + Send + Sync>;

/// Fan-out point for [`ViewerEvent`]s.
///
/// Clones share the same subscriber list, so the ledger and the controller
/// can hold their own handle and publish to the same listeners. Emitting
/// with no subscribers drops the event.
#[derive(Clone, Default)]
pub struct EventSink {
    handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked for every emitted event
    pub fn on_event<F>(&self, cb: F)
    where
        F: Fn(&ViewerEvent) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(Arc::new(cb));
        }
    }

    /// Remove every registered callback
    pub fn clear(&self) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.clear();
        }
    }

    pub fn emit(&self, event: ViewerEvent) {
        log::debug!("viewer event: {:?}", event);
        // Snapshot the list so callbacks may subscribe without deadlocking.
        let handlers: Vec<EventHandler> = match self.handlers.lock() {
            Ok(h) => h.clone(),
            Err(_) => return,
        };
        for handler in handlers {
            handler(&event);
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.handlers.lock().map(|h| h.len()).unwrap_or(0);
        f.debug_struct("EventSink").field("handlers", &count).finish()
    }
}

/// Records every event it sees; handy for tests and the CLI.
#[derive(Clone, Default, Debug)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ViewerEvent>>>,
}

impl EventLog {
    /// Create a log subscribed to `sink`
    pub fn attach(sink: &EventSink) -> Self {
        let log = EventLog::default();
        let events = log.events.clone();
        sink.on_event(move |ev| {
            if let Ok(mut e) = events.lock() {
                e.push(ev.clone());
            }
        });
        log
    }

    pub fn events(&self) -> Vec<ViewerEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Drain recorded events
    pub fn take(&self) -> Vec<ViewerEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }

    pub fn count_completed(&self, id: &StepId) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ViewerEvent::StepCompleted { step_id } if step_id == id))
            .count()
    }
}
