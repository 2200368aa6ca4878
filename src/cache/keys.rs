//! Cache key derivation.
//!
//! A page is addressed only by its request path. Query strings, headers and
//! cookies do not contribute to the key.

use std::fmt;

use sha2::{Digest, Sha256};

/// Extension of server-side scripts that never enter the cache.
const SCRIPT_EXTENSION: &str = ".php";

/// Number of digest bytes kept in a key (128 bits).
const KEY_BYTES: usize = 16;

/// Opaque, deterministic identifier for a cached page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a request path.
    ///
    /// The key is the hex encoding of the first 128 bits of the SHA-256
    /// digest of the path, so it is stable across processes and restarts.
    pub fn derive(request_path: &str) -> Self {
        let digest = Sha256::digest(request_path.as_bytes());
        Self(hex::encode(&digest[..KEY_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shorthand for [`CacheKey::derive`].
pub fn derive_key(request_path: &str) -> CacheKey {
    CacheKey::derive(request_path)
}

/// Returns true for paths that name a server-side script.
///
/// Script output is never cached; such requests skip the pipeline entirely.
pub fn is_script_path(request_path: &str) -> bool {
    request_path.ends_with(SCRIPT_EXTENSION)
}
