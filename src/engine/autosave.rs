//! Periodic background save

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use super::Engine;

/// Running autosave task
///
/// Dropping the handle also ends the task, after any save in progress.
pub struct AutosaveHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Stop the task and wait until it has exited
    pub async fn stop(self) {
        self.shutdown.send(()).ok();
        if let Err(e) = self.task.await {
            error!("Autosave task failed: {}", e);
        }
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Engine {
    /// Save every `period` on the current tokio runtime
    ///
    /// Failed saves are logged and retried on the next tick.
    pub fn spawn_autosave(self: &Arc<Self>, period: Duration) -> AutosaveHandle {
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let engine = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("Autosave stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let engine = Arc::clone(&engine);
                        match tokio::task::spawn_blocking(move || engine.save()).await {
                            Ok(Ok(report)) if report.pruned() => {
                                warn!(
                                    "Autosave evicted {} endpoints to stay within budget",
                                    report.evicted.len()
                                );
                            }
                            Ok(Ok(report)) => debug!("Autosaved {} bytes", report.bytes),
                            Ok(Err(e)) => warn!("Autosave failed: {}", e),
                            Err(e) => error!("Autosave worker panicked: {}", e),
                        }
                    }
                }
            }
        });

        AutosaveHandle { shutdown, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::fingerprint::{derive_key, Method};
    use crate::persist::{MemoryStorage, PersistenceManager, Storage};
    use serde_json::json;

    fn persistent_engine(storage: &Arc<MemoryStorage>) -> Arc<Engine> {
        let manager = PersistenceManager::new(
            Arc::clone(storage) as Arc<dyn Storage>,
            "state",
            LimitsConfig::default(),
        )
        .unwrap();
        Arc::new(Engine::with_persistence("https://a.test", manager).unwrap())
    }

    #[tokio::test]
    async fn test_autosave_writes_periodically() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = persistent_engine(&storage);
        let key = derive_key("https://a.test", Method::Get, "/u", None::<&()>, false);
        engine.write_state().store.capture(&key, json!(1), 200, 1);

        let handle = engine.spawn_autosave(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        let persisted = storage.get("state").unwrap().unwrap();
        assert!(persisted.contains("/u"));
    }

    #[tokio::test]
    async fn test_stop_prevents_further_writes() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = persistent_engine(&storage);

        let handle = engine.spawn_autosave(Duration::from_secs(3600));
        handle.stop().await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_failing_save_keeps_task_alive() {
        let engine = Arc::new(Engine::new("https://a.test"));

        let handle = engine.spawn_autosave(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!handle.is_finished());
        handle.stop().await;
    }
}
