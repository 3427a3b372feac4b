//! Update notification channel between the lifecycle and the application
//! shell.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Signal that a newer version of the cache layer finished installing while
/// an older one is still active. Carries no payload; the shell decides what
/// to do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateAvailable;

/// Sender half, held by the lifecycle manager.
///
/// Emits at most one `UpdateAvailable` per newly installed version no matter
/// how often the waiting transition is observed.
#[derive(Clone)]
pub struct UpdateNotifier {
  tx: mpsc::UnboundedSender<UpdateAvailable>,
  notified: Arc<Mutex<HashSet<String>>>,
}

impl UpdateNotifier {
  /// Report that `version` reached waiting while older stores exist.
  pub fn version_waiting(&self, version: &str) {
    let mut notified = match self.notified.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };

    if notified.insert(version.to_string()) {
      // Receiver may be gone; nothing to do then
      let _ = self.tx.send(UpdateAvailable);
    }
  }
}

/// Receiver half, consumed by the application shell.
pub struct UpdateEvents {
  rx: mpsc::UnboundedReceiver<UpdateAvailable>,
}

impl UpdateEvents {
  /// Wait for the next notification. For long-running shells; the CLI
  /// only ever polls.
  #[allow(dead_code)]
  pub async fn next(&mut self) -> Option<UpdateAvailable> {
    self.rx.recv().await
  }

  /// Non-blocking check for a pending notification.
  pub fn try_next(&mut self) -> Option<UpdateAvailable> {
    self.rx.try_recv().ok()
  }
}

/// Create a connected notifier/receiver pair.
pub fn update_channel() -> (UpdateNotifier, UpdateEvents) {
  let (tx, rx) = mpsc::unbounded_channel();

  (
    UpdateNotifier {
      tx,
      notified: Arc::new(Mutex::new(HashSet::new())),
    },
    UpdateEvents { rx },
  )
}
