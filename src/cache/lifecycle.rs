//! Install/activate lifecycle for the versioned cache stores.
//!
//! A deployed version moves through installing → waiting → activating →
//! active; a version displaced by a newer one is redundant. Install
//! populates the static store atomically; activation prunes every persisted
//! store that does not belong to the current version set.

use color_eyre::{eyre::eyre, Result};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::interceptor::CachePolicy;
use super::notify::UpdateNotifier;
use super::remote::{OutboundRequest, RemoteFetch};
use super::traits::{RequestKey, StoreName, StoreProvider};

/// Readiness of a deployed version of the cache layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
  /// Static store population in progress.
  Installing,
  /// Installed and ready, not yet serving.
  Waiting,
  /// Taking over: pruning stores of other versions.
  Activating,
  /// Serving traffic.
  Active,
  /// Displaced by a newer activated version.
  Redundant,
}

impl fmt::Display for LifecyclePhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      LifecyclePhase::Installing => "installing",
      LifecyclePhase::Waiting => "waiting",
      LifecyclePhase::Activating => "activating",
      LifecyclePhase::Active => "active",
      LifecyclePhase::Redundant => "redundant",
    };
    f.write_str(s)
  }
}

/// Owns all lifecycle state transitions and the stores they affect.
///
/// The interceptor only ever reads committed stores; this manager is the
/// sole writer during install and pruning.
pub struct LifecycleManager<P, N> {
  stores: Arc<P>,
  remote: Arc<N>,
  policy: CachePolicy,
  notifier: UpdateNotifier,
  phase: Mutex<LifecyclePhase>,
}

impl<P: StoreProvider, N: RemoteFetch> LifecycleManager<P, N> {
  pub fn new(
    stores: Arc<P>,
    remote: Arc<N>,
    policy: CachePolicy,
    notifier: UpdateNotifier,
  ) -> Self {
    Self {
      stores,
      remote,
      policy,
      notifier,
      phase: Mutex::new(LifecyclePhase::Installing),
    }
  }

  pub fn phase(&self) -> LifecyclePhase {
    match self.phase.lock() {
      Ok(guard) => *guard,
      Err(poisoned) => *poisoned.into_inner(),
    }
  }

  fn set_phase(&self, phase: LifecyclePhase) {
    match self.phase.lock() {
      Ok(mut guard) => *guard = phase,
      Err(poisoned) => *poisoned.into_inner() = phase,
    }
  }

  pub fn static_store(&self) -> &StoreName {
    &self.policy.static_store
  }

  pub fn api_store(&self) -> &StoreName {
    &self.policy.api_store
  }

  /// Rendered identity of this version set, e.g. `static-v1/api-v1`.
  pub fn version_token(&self) -> String {
    format!("{}/{}", self.policy.static_store, self.policy.api_store)
  }

  /// Populate the static store with every asset in the set.
  ///
  /// All fetches are staged before the first write, so a failed fetch
  /// leaves the store exactly as it was; a failed write discards the store
  /// wholesale. Either way no partially populated static cache survives.
  pub async fn install(&self) -> Result<()> {
    self.set_phase(LifecyclePhase::Installing);

    if self.policy.assets.is_empty() {
      debug!("static asset set is empty; nothing to stage");
    }

    let mut staged = Vec::with_capacity(self.policy.assets.len());
    for path in self.policy.assets.iter() {
      let key = RequestKey::resolve("GET", &self.policy.origin, path)?;
      let response = self
        .remote
        .fetch(&OutboundRequest::new(key.clone()))
        .await
        .map_err(|e| eyre!("Install aborted: failed to fetch {}: {}", path, e))?;

      if !response.is_success() {
        return Err(eyre!(
          "Install aborted: {} answered {}",
          path,
          response.status
        ));
      }

      staged.push((key, response));
    }

    for (key, response) in &staged {
      if let Err(e) = self.stores.put(&self.policy.static_store, key, response) {
        let _ = self.stores.delete_store(&self.policy.static_store);
        return Err(eyre!("Install aborted: could not persist {}: {}", key, e));
      }
    }

    info!(
      "installed {} ({} assets)",
      self.policy.static_store,
      staged.len()
    );
    self.set_phase(LifecyclePhase::Waiting);
    self.signal_if_update();

    Ok(())
  }

  /// Take over: prune every persisted store outside the current version
  /// set. Pruning hiccups are tolerated; the target state is reached
  /// idempotently on the next activation.
  pub fn activate(&self) {
    self.set_phase(LifecyclePhase::Activating);

    match self.stores.list_stores() {
      Ok(names) => {
        for name in names {
          if name == self.policy.static_store || name == self.policy.api_store {
            continue;
          }
          match self.stores.delete_store(&name) {
            Ok(true) => debug!("pruned stale store {}", name),
            Ok(false) => debug!("stale store {} was already gone", name),
            Err(e) => debug!("could not prune {}: {}", name, e),
          }
        }
      }
      Err(e) => debug!("could not enumerate stores during activation: {}", e),
    }

    info!("activated {}", self.version_token());
    self.set_phase(LifecyclePhase::Active);
  }

  /// Install and immediately claim, the way the deployed shell registers
  /// a new version.
  pub async fn register(&self) -> Result<()> {
    self.install().await?;
    self.activate();
    Ok(())
  }

  /// If stores from another version set are still persisted, this install
  /// is an update over an active predecessor; tell the shell once.
  fn signal_if_update(&self) {
    match self.stores.list_stores() {
      Ok(names) => {
        let displaced = names
          .iter()
          .any(|n| *n != self.policy.static_store && *n != self.policy.api_store);
        if displaced {
          self.notifier.version_waiting(&self.version_token());
        }
      }
      Err(e) => debug!("could not check for displaced stores: {}", e),
    }
  }
}
