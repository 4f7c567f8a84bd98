// src/bus.rs

//! Process-wide event bus singleton
//!
//! The engine publishes [`Event`]s onto a single injected sink. The sink is
//! installed by the embedding application via [`set`] and removed with
//! [`reset`] (tests use the latter to isolate themselves). Publishing with
//! no sink installed is a no-op.
//!
//! Library code must never subscribe to the bus it publishes on; the sink
//! is strictly an outbound channel, which is what keeps publishing
//! deadlock-free.

use crate::event::Event;
use std::sync::RwLock;

/// Receives every event the engine publishes
pub trait Sink: Send + Sync {
    fn publish(&self, event: Event);
}

static BUS: RwLock<Option<Box<dyn Sink>>> = RwLock::new(None);

/// Install the process-wide event sink. Replaces any previous sink.
pub fn set(sink: Box<dyn Sink>) {
    if let Ok(mut bus) = BUS.write() {
        *bus = Some(sink);
    }
}

/// Remove the installed sink, returning the bus to its no-op state.
pub fn reset() {
    if let Ok(mut bus) = BUS.write() {
        *bus = None;
    }
}

/// Publish an event to the installed sink, if any.
pub fn publish(event: Event) {
    if let Ok(bus) = BUS.read() {
        if let Some(sink) = bus.as_ref() {
            sink.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{TaskDescription, TaskProgress};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);

    impl Sink for CountingSink {
        fn publish(&self, _event: Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn task_event() -> Event {
        Event::CatalogerTaskStarted {
            description: TaskDescription::default(),
            progress: TaskProgress::new(1),
        }
    }

    #[test]
    fn test_publish_without_sink_is_noop() {
        reset();
        publish(task_event());
    }

    #[test]
    fn test_set_publish_reset() {
        let count = Arc::new(AtomicUsize::new(0));
        set(Box::new(CountingSink(count.clone())));

        publish(task_event());
        publish(task_event());
        assert!(count.load(Ordering::SeqCst) >= 2);

        reset();
        let before = count.load(Ordering::SeqCst);
        publish(task_event());
        assert_eq!(count.load(Ordering::SeqCst), before);
    }
}
