//! Process-wide registry of live environments.
//!
//! Every environment the provisioner creates is recorded here under its
//! unique name from the moment creation starts until teardown begins. The
//! registry is what makes `destroy` idempotent and what the end-of-run sweep
//! walks to guarantee nothing is left behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use super::types::{EnvHandle, ProvisionError};

#[derive(Debug, Clone)]
enum Slot {
  /// Name reserved, manager call in flight.
  Pending,
  Live(EnvHandle),
}

#[derive(Debug, Default)]
pub struct EnvRegistry {
  slots: Mutex<HashMap<String, Slot>>,
}

impl EnvRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// The registry shared by every provisioner in this process.
  pub fn global() -> Arc<Self> {
    static GLOBAL: OnceLock<Arc<EnvRegistry>> = OnceLock::new();
    GLOBAL.get_or_init(|| Arc::new(EnvRegistry::new())).clone()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
    // A poisoned map is still structurally valid.
    self.slots.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Claim `name` before creating the environment.
  pub fn reserve(&self, name: &str) -> Result<(), ProvisionError> {
    let mut slots = self.lock();
    if slots.contains_key(name) {
      return Err(ProvisionError::NameInUse(name.to_string()));
    }
    slots.insert(name.to_string(), Slot::Pending);
    Ok(())
  }

  /// Record the handle of a created environment.
  pub fn activate(&self, handle: EnvHandle) {
    self.lock().insert(handle.name.clone(), Slot::Live(handle));
  }

  /// Drop a reservation whose creation failed.
  pub fn forget(&self, name: &str) {
    let mut slots = self.lock();
    if matches!(slots.get(name), Some(Slot::Pending)) {
      slots.remove(name);
    }
  }

  /// Remove a live environment, returning its handle.
  ///
  /// Returns `None` when the name is unknown, already taken, or still being
  /// created, so at most one caller ever tears a given environment down.
  pub fn take(&self, name: &str) -> Option<EnvHandle> {
    let mut slots = self.lock();
    match slots.get(name) {
      Some(Slot::Live(_)) => match slots.remove(name) {
        Some(Slot::Live(handle)) => Some(handle),
        _ => None,
      },
      _ => None,
    }
  }

  /// Remove every live environment, returning their handles.
  pub fn take_all(&self) -> Vec<EnvHandle> {
    let mut slots = self.lock();
    let names: Vec<String> = slots
      .iter()
      .filter(|(_, slot)| matches!(slot, Slot::Live(_)))
      .map(|(name, _)| name.clone())
      .collect();

    let mut handles: Vec<EnvHandle> = names
      .iter()
      .filter_map(|name| match slots.remove(name) {
        Some(Slot::Live(handle)) => Some(handle),
        _ => None,
      })
      .collect();
    handles.sort_by(|a, b| a.name.cmp(&b.name));
    handles
  }

  pub fn contains(&self, name: &str) -> bool {
    self.lock().contains_key(name)
  }

  /// Names of reserved or live environments, sorted.
  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.lock().keys().cloned().collect();
    names.sort();
    names
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
