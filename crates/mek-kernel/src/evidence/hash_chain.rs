//! Deterministic hash chain over bundle elements.
//!
//! The chain is seeded from the bundle identity and folds every element's
//! canonical serialization in a fixed, documented order:
//!
//! ```text
//! H_0 = SHA256(bundle_id || created_at)
//! H_i = SHA256(H_{i-1} || canonical(element_i))
//! ```
//!
//! Any alteration of any byte after sealing changes the root.

use serde::Serialize;

use crate::canonical::{self, CanonicalError, Digest256};
use crate::clock::Tick;

/// Incremental hash chain state.
#[derive(Debug, Clone)]
pub struct HashChain {
    state: Digest256,
}

impl HashChain {
    /// Seed the chain from the bundle identity.
    #[must_use]
    pub fn seed(bundle_id: &str, created_at: Tick) -> Self {
        let mut seed = Vec::with_capacity(bundle_id.len() + 20);
        seed.extend_from_slice(bundle_id.as_bytes());
        seed.extend_from_slice(created_at.to_string().as_bytes());
        Self {
            state: canonical::sha256(&seed),
        }
    }

    /// Fold one element into the chain.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if the element cannot be canonically
    /// serialized; the chain state is left unchanged.
    pub fn push<T: Serialize>(&mut self, element: &T) -> Result<(), CanonicalError> {
        let serialized = canonical::to_canonical_json(element)?;
        let mut input = Vec::with_capacity(self.state.len() + serialized.len());
        input.extend_from_slice(&self.state);
        input.extend_from_slice(serialized.as_bytes());
        self.state = canonical::sha256(&input);
        Ok(())
    }

    /// The chain root, hex-encoded lowercase.
    #[must_use]
    pub fn root_hex(&self) -> String {
        hex::encode(self.state)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn identical_sequences_share_a_root() {
        let mut a = HashChain::seed("BDL-1", 42);
        let mut b = HashChain::seed("BDL-1", 42);
        a.push(&Value::from("element")).expect("push");
        b.push(&Value::from("element")).expect("push");
        assert_eq!(a.root_hex(), b.root_hex());
    }

    #[test]
    fn seed_identity_matters() {
        let a = HashChain::seed("BDL-1", 42);
        let b = HashChain::seed("BDL-2", 42);
        let c = HashChain::seed("BDL-1", 43);
        assert_ne!(a.root_hex(), b.root_hex());
        assert_ne!(a.root_hex(), c.root_hex());
    }

    #[test]
    fn element_order_matters() {
        let mut a = HashChain::seed("BDL-1", 42);
        let mut b = HashChain::seed("BDL-1", 42);
        a.push(&Value::from(1)).expect("push");
        a.push(&Value::from(2)).expect("push");
        b.push(&Value::from(2)).expect("push");
        b.push(&Value::from(1)).expect("push");
        assert_ne!(a.root_hex(), b.root_hex());
    }

    #[test]
    fn any_element_change_changes_the_root() {
        let mut a = HashChain::seed("BDL-1", 42);
        let mut b = HashChain::seed("BDL-1", 42);
        a.push(&Value::from("x")).expect("push");
        b.push(&Value::from("y")).expect("push");
        assert_ne!(a.root_hex(), b.root_hex());
    }
}
