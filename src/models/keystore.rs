//! Keystore configuration and digest parsing.

use std::collections::HashMap;
use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::error::{BridgeError, BridgeResult};

lazy_static! {
    static ref DIGEST_LINE_REGEX: Regex =
        Regex::new(r"(?m)^\s*(SHA-512|SHA-256|SHA-1|MD5):\s*([0-9A-Fa-f:]+)\s*$").unwrap();
}

/// Custom-signing configuration carried by a session.
#[derive(Debug, Clone, Default)]
pub struct KeystoreConfig {
    /// Sign with the keystore below instead of the bundled default cert.
    pub use_keystore: bool,
    pub keystore_path: Option<PathBuf>,
    pub key_alias: Option<String>,
    pub keystore_password: Option<String>,
    pub key_password: Option<String>,
}

impl KeystoreConfig {
    /// Path/alias/passwords, present iff custom signing is fully configured.
    pub fn credentials(&self) -> Option<(&PathBuf, &str, &str, &str)> {
        if !self.use_keystore {
            return None;
        }
        Some((
            self.keystore_path.as_ref()?,
            self.key_alias.as_deref()?,
            self.keystore_password.as_deref()?,
            self.key_password.as_deref()?,
        ))
    }
}

/// Certificate digests of a keystore entry, keyed by algorithm name
/// (`sha512|sha256|sha1|md5`), lowercase hex with colons stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeystoreHash {
    digests: HashMap<String, String>,
}

impl KeystoreHash {
    /// Parses `keytool -v -list` output. At least one digest line must be
    /// present for the result to count as parsed.
    pub fn parse(output: &str) -> BridgeResult<Self> {
        let mut digests = HashMap::new();
        for caps in DIGEST_LINE_REGEX.captures_iter(output) {
            let algorithm = caps[1].replace('-', "").to_lowercase();
            let digest = caps[2].replace(':', "").to_lowercase();
            digests.insert(algorithm, digest);
        }
        if digests.is_empty() {
            return Err(BridgeError::parse_failure(
                output.lines().next().unwrap_or_default(),
                "at least one keytool digest line",
            ));
        }
        Ok(Self { digests })
    }

    pub fn get(&self, algorithm: &str) -> Option<&str> {
        self.digests.get(algorithm).map(String::as_str)
    }

    /// True when any stored digest equals `candidate` (case-insensitive hex).
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.to_lowercase();
        self.digests.values().any(|d| *d == candidate)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.digests.values().map(String::as_str)
    }
}
