// src/event.rs

//! Structured progress events published by the cataloging engine
//!
//! Events carry shared [`TaskProgress`] handles: the publisher keeps
//! updating the handle after the event is delivered, so subscribers on the
//! other side of the bus observe live progress without further events.
//!
//! Delivery is best-effort and events may be observed out of order.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

/// Live progress state for a single task
///
/// Thread-safe; publishers update it from worker threads while subscribers
/// poll it from a UI thread.
#[derive(Debug, Default)]
pub struct TaskProgress {
    current: AtomicI64,
    total: AtomicI64,
    stage: RwLock<String>,
    completed: AtomicBool,
    errored: AtomicBool,
}

impl TaskProgress {
    pub fn new(total: i64) -> Arc<Self> {
        let progress = TaskProgress::default();
        progress.total.store(total, Ordering::Relaxed);
        Arc::new(progress)
    }

    pub fn set_total(&self, total: i64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn increment(&self, amount: i64) {
        self.current.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn set_stage(&self, stage: &str) {
        if let Ok(mut s) = self.stage.write() {
            *s = stage.to_string();
        }
    }

    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> i64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn stage(&self) -> String {
        self.stage.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn set_completed(&self) {
        self.completed.store(true, Ordering::Relaxed);
    }

    pub fn set_errored(&self) {
        self.errored.store(true, Ordering::Relaxed);
        self.completed.store(true, Ordering::Relaxed);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::Relaxed)
    }
}

/// Identifier of the aggregate cataloging task
pub const TOP_LEVEL_CATALOGING_TASK: &str = "cataloging";
/// Identifier of the package-cataloging parent task
pub const PACKAGE_CATALOGING_TASK: &str = "package-cataloging";

/// Descriptive fields for a task-started event
#[derive(Debug, Clone, Default)]
pub struct TaskDescription {
    /// Stable identifier, used to parent nested tasks
    pub id: String,
    /// Identifier of the parent task, empty for top-level tasks
    pub parent_id: String,
    /// Human-readable title
    pub title: String,
    /// Extra context shown next to the title
    pub context: String,
}

/// An event published onto the process-wide bus
#[derive(Debug, Clone)]
pub enum Event {
    /// A source began indexing its filesystem
    FileIndexingStarted {
        path: String,
        progress: Arc<TaskProgress>,
    },

    /// A cataloger (or one of its sub-tasks) started
    CatalogerTaskStarted {
        description: TaskDescription,
        progress: Arc<TaskProgress>,
    },
}

impl Event {
    /// The live progress handle carried by this event.
    pub fn progress(&self) -> &Arc<TaskProgress> {
        match self {
            Event::FileIndexingStarted { progress, .. } => progress,
            Event::CatalogerTaskStarted { progress, .. } => progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_progress_updates() {
        let progress = TaskProgress::new(10);
        progress.increment(3);
        progress.increment(2);
        assert_eq!(progress.current(), 5);
        assert_eq!(progress.total(), 10);

        progress.set_stage("/etc/passwd");
        assert_eq!(progress.stage(), "/etc/passwd");

        assert!(!progress.is_completed());
        progress.set_completed();
        assert!(progress.is_completed());
        assert!(!progress.is_errored());
    }

    #[test]
    fn test_errored_implies_completed() {
        let progress = TaskProgress::new(1);
        progress.set_errored();
        assert!(progress.is_completed());
        assert!(progress.is_errored());
    }

    #[test]
    fn test_event_exposes_shared_progress() {
        let progress = TaskProgress::new(4);
        let event = Event::CatalogerTaskStarted {
            description: TaskDescription {
                id: "rpm-db-cataloger".to_string(),
                ..Default::default()
            },
            progress: progress.clone(),
        };

        progress.increment(4);
        assert_eq!(event.progress().current(), 4);
    }
}
