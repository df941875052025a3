//! Detached background work (cache refreshes) that outlives the request that started it.

use std::future::Future;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

/// Tracks spawned background tasks so the host can wait for them before shutting down.
///
/// Tasks run on the tokio runtime independently of the caller; dropping the
/// future that spawned them does not cancel them.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
  handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl BackgroundTasks {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn spawn<F>(&self, name: &'static str, future: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let handle = tokio::spawn(future);
    match self.handles.lock() {
      Ok(mut handles) => {
        handles.retain(|(_, h)| !h.is_finished());
        handles.push((name, handle));
      }
      // Still running, just not tracked
      Err(e) => warn!(task = name, error = %e, "background task list poisoned"),
    }
  }

  /// Wait for every tracked task, including ones spawned while waiting.
  ///
  /// Returns the number of tasks awaited.
  pub async fn drain(&self) -> usize {
    let mut drained = 0;
    loop {
      let batch: Vec<_> = match self.handles.lock() {
        Ok(mut handles) => handles.drain(..).collect(),
        Err(_) => return drained,
      };
      if batch.is_empty() {
        return drained;
      }
      for (name, handle) in batch {
        if let Err(e) = handle.await {
          warn!(task = name, error = %e, "background task failed");
        }
        drained += 1;
      }
    }
  }
}
