//! Content-addressed cache of verified APK signatures.
//!
//! Keyed by the SHA-256 of the APK file. An entry is only valid for the
//! keystore configuration it was recorded under, so sessions with different
//! signing setups never share verdicts. The default instance is process-wide
//! and bounded.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;

use crate::constants::defaults;

/// One verified-signature record.
#[derive(Debug, Clone)]
pub struct SignedApkEntry {
    /// Raw `apksigner verify --print-certs` stdout.
    pub apksigner_output: String,
    /// Digests that were acceptable when the entry was recorded.
    pub expected_hashes: Vec<String>,
    /// Keystore the verdict belongs to; `None` for the default certificate.
    pub keystore_path: Option<PathBuf>,
}

/// Bounded LRU of [`SignedApkEntry`], keyed by file content hash.
pub struct SignedApkCache {
    capacity: usize,
    entries: HashMap<String, SignedApkEntry>,
    order: VecDeque<String>,
}

impl SignedApkCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Looks up an entry recorded under the given keystore configuration.
    /// A hit refreshes the entry's recency.
    pub fn get(&mut self, hash: &str, keystore_path: Option<&PathBuf>) -> Option<SignedApkEntry> {
        let entry = self.entries.get(hash)?;
        if entry.keystore_path.as_ref() != keystore_path {
            return None;
        }
        let entry = entry.clone();
        self.touch(hash);
        Some(entry)
    }

    /// Records an entry, evicting the least recently used beyond capacity.
    pub fn put(&mut self, hash: String, entry: SignedApkEntry) {
        if self.entries.insert(hash.clone(), entry).is_none() {
            self.order.push_back(hash);
        } else {
            self.touch(&hash);
        }
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, hash: &str) {
        if let Some(pos) = self.order.iter().position(|h| h == hash) {
            let key = self.order.remove(pos).unwrap();
            self.order.push_back(key);
        }
    }
}

lazy_static! {
    static ref SHARED: Arc<Mutex<SignedApkCache>> =
        Arc::new(Mutex::new(SignedApkCache::new(defaults::SIGNED_APP_CACHE_SIZE)));
}

/// The process-wide cache shared by sessions without a private one.
pub fn shared_cache() -> Arc<Mutex<SignedApkCache>> {
    Arc::clone(&SHARED)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(keystore: Option<&str>) -> SignedApkEntry {
        SignedApkEntry {
            apksigner_output: "digest: abc".to_string(),
            expected_hashes: vec!["abc".to_string()],
            keystore_path: keystore.map(PathBuf::from),
        }
    }

    #[test]
    fn keystore_mismatch_bypasses_entry() {
        let mut cache = SignedApkCache::new(4);
        cache.put("hash1".to_string(), entry(None));
        assert!(cache.get("hash1", None).is_some());
        assert!(cache
            .get("hash1", Some(&PathBuf::from("/tmp/other.keystore")))
            .is_none());
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = SignedApkCache::new(2);
        cache.put("a".to_string(), entry(None));
        cache.put("b".to_string(), entry(None));
        // Touch `a`, making `b` the eviction candidate.
        assert!(cache.get("a", None).is_some());
        cache.put("c".to_string(), entry(None));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b", None).is_none());
        assert!(cache.get("a", None).is_some());
        assert!(cache.get("c", None).is_some());
    }

    #[test]
    fn reinsert_updates_recency() {
        let mut cache = SignedApkCache::new(2);
        cache.put("a".to_string(), entry(None));
        cache.put("b".to_string(), entry(None));
        cache.put("a".to_string(), entry(Some("/ks")));
        cache.put("c".to_string(), entry(None));
        assert!(cache.get("b", None).is_none());
        assert!(cache.get("a", Some(&PathBuf::from("/ks"))).is_some());
    }
}
