//! Instruction selectors
//!
//! The first eight bytes of every payload identify the remote operation:
//! `sha256("<namespace>:<operation>")[..8]`, with `global` as the namespace
//! for ordinary instruction handlers.

use sha2::{Digest, Sha256};
use std::fmt;

pub const SELECTOR_LEN: usize = 8;

pub const GLOBAL_NAMESPACE: &str = "global";

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selector([u8; SELECTOR_LEN]);

impl Selector {
    /// Selector of an instruction handler in the global namespace
    pub fn of(operation: &str) -> Self {
        Self::namespaced(GLOBAL_NAMESPACE, operation)
    }

    pub fn namespaced(namespace: &str, name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update(b":");
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; SELECTOR_LEN];
        bytes.copy_from_slice(&digest[..SELECTOR_LEN]);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; SELECTOR_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SELECTOR_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.to_hex())
    }
}

impl AsRef<[u8]> for Selector {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

pub fn selector_of(operation: &str) -> Selector {
    Selector::of(operation)
}
