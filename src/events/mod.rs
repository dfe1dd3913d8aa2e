//! Observability bus: broadcast points for the task loop plus a stop flag an
//! external controller (UI cancel button, Ctrl-C handler) can raise.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock,
};

use serde_json::Value;

use crate::execution::{CodeBlocks, StructuredResult};

#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    TaskStart(&'a Value),
    Exec(&'a CodeBlocks),
    Result(&'a StructuredResult),
    Summary(&'a str),
    Display { path: Option<&'a str>, url: Option<&'a str> },
}

impl Event<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskStart(_) => "task_start",
            Event::Exec(_) => "exec",
            Event::Result(_) => "result",
            Event::Summary(_) => "summary",
            Event::Display { .. } => "display",
        }
    }
}

type Listener = Arc<dyn Fn(&Event<'_>) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
    stopped: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(Arc::new(listener));
        }
    }

    pub fn broadcast(&self, event: Event<'_>) {
        tracing::debug!(event = event.name(), "broadcast");
        // Listeners run outside the lock so they may subscribe or broadcast.
        let listeners: Vec<Listener> = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for listener in &listeners {
            listener(&event);
        }
    }

    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn reset_stop(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }
}
