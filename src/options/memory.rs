use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::OptionStore;
use crate::error::Result;

/// Option store that lives in memory and counts saves.
#[derive(Default)]
pub struct MemoryOptions {
  values: Mutex<BTreeMap<String, String>>,
  saves: AtomicUsize,
}

impl MemoryOptions {
  pub fn with(pairs: &[(&str, &str)]) -> Self {
    let store = Self::default();
    for (key, value) in pairs {
      store.set(key, value);
    }
    store
  }

  pub fn save_count(&self) -> usize {
    self.saves.load(Ordering::SeqCst)
  }
}

impl OptionStore for MemoryOptions {
  fn get(&self, key: &str) -> Option<String> {
    self.values.lock().unwrap().get(key).cloned()
  }

  fn set(&self, key: &str, value: &str) {
    self
      .values
      .lock()
      .unwrap()
      .insert(key.to_string(), value.to_string());
  }

  fn remove(&self, key: &str) {
    self.values.lock().unwrap().remove(key);
  }

  fn save(&self) -> Result<()> {
    self.saves.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}
