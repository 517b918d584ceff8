//! Lazily started, stoppable scheduler handle

use crate::scheduler::priority::TaskScheduler;
use std::sync::Arc;
use tokio::sync::Mutex;

type Factory = Box<dyn Fn() -> TaskScheduler + Send + Sync>;

/// Owns at most one live [`TaskScheduler`].
///
/// `get_or_start` creates one on first use (or after `stop`); `stop` shuts the
/// current one down and clears the slot.
pub struct SchedulerSlot {
    factory: Factory,
    current: Mutex<Option<Arc<TaskScheduler>>>,
}

impl SchedulerSlot {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> TaskScheduler + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            current: Mutex::new(None),
        }
    }

    pub async fn get_or_start(&self) -> Arc<TaskScheduler> {
        let mut current = self.current.lock().await;
        match current.as_ref() {
            Some(scheduler) if !scheduler.is_shut_down() => scheduler.clone(),
            _ => {
                let scheduler = Arc::new((self.factory)());
                *current = Some(scheduler.clone());
                scheduler
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|scheduler| !scheduler.is_shut_down())
    }

    /// Shut down the live scheduler, if any
    pub async fn stop(&self) {
        let scheduler = self.current.lock().await.take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
    }
}
