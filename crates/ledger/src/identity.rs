//! Pseudonymous identity derivation.
//!
//! Raw client addresses never reach the stored documents. Each address is
//! mixed with a deployment salt and hashed, and only the resulting token is
//! recorded, so the ledger cannot be walked back to an address without the
//! salt.

use sha2::{Digest, Sha256};

/// Bucket for clients whose address could not be determined. All such
/// clients share one identity and one vote per item.
const UNKNOWN_ADDRESS: &str = "unknown";

/// Derives stable pseudonymous identity tokens from client addresses
#[derive(Debug, Clone)]
pub struct IdentityDeriver {
    salt: String,
}

impl IdentityDeriver {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Derive the identity token for an address.
    ///
    /// The same address and salt always produce the same token. A blank
    /// address falls into the shared [`UNKNOWN_ADDRESS`] bucket.
    pub fn derive(&self, raw_address: &str) -> String {
        let address = raw_address.trim();
        let address = if address.is_empty() {
            UNKNOWN_ADDRESS
        } else {
            address
        };

        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(address.as_bytes());
        hex::encode(hasher.finalize())
    }
}
