use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Deterministic identity of a provider request, used as the cache index.
///
/// Rendered as `FUNCTION?k1=v1&k2=v2` with parameters sorted by name, so
/// insertion order never changes the key. A credential scope, when present,
/// is appended as `#scope`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new<I, K, V>(operation: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let sorted: BTreeMap<String, String> = params
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();

        let query = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
            .collect::<Vec<_>>()
            .join("&");

        RequestKey(format!("{}?{}", escape(operation), query))
    }

    /// Partition the key by credential. `None` leaves the key unchanged.
    pub fn scoped(self, scope: Option<&str>) -> Self {
        match scope {
            Some(scope) => RequestKey(format!("{}#{}", self.0, escape(scope))),
            None => self,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short fingerprint of a credential: the first 16 hex chars of its SHA-256.
pub fn credential_scope(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    hex::encode(digest)[..16].to_string()
}

// Separators must not leak out of names or values or two distinct
// parameter sets could render to the same key.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '?' => out.push_str("%3F"),
            '#' => out.push_str("%23"),
            _ => out.push(c),
        }
    }
    out
}
