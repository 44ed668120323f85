use parking_lot::{Mutex, RwLock};

use crate::prelude::{HashMap, HashSet};

/// URIs whose builds keep failing. A blacklisted URI is no longer advertised
/// as a child by newly built tiles.
#[derive(Debug)]
pub struct Blacklist {
    threshold: u32,
    failures: Mutex<HashMap<String, u32>>,
    entries: RwLock<HashSet<String>>,
}

impl Blacklist {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failures: Mutex::new(HashMap::default()),
            entries: RwLock::new(HashSet::default()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.entries.read().contains(uri)
    }

    pub fn add(&self, uri: impl Into<String>) {
        self.entries.write().insert(uri.into());
    }

    /// Counts a failed build of `uri`. Returns true once it is blacklisted.
    pub fn record_failure(&self, uri: &str) -> bool {
        let count = {
            let mut failures = self.failures.lock();
            let count = failures.entry(uri.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if count >= self.threshold {
            if !self.contains(uri) {
                log::warn!("blacklisting '{}' after {} failed builds", uri, count);
            }
            self.add(uri);
            true
        } else {
            false
        }
    }

    /// Forgets earlier failures after a successful build.
    pub fn record_success(&self, uri: &str) {
        self.failures.lock().remove(uri);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.failures.lock().clear();
        self.entries.write().clear();
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new(3)
    }
}
