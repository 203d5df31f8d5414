//! Tally
//!
//! Anonymous vote tallying over two independently versioned JSON documents
//! in a conditional-write store, with pseudonymous identities and bounded
//! conflict retries.

/// Module version information
pub mod version {
    /// The current version of the tally library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Re-export the document store layer
pub mod storage {
    pub use tally_storage::*;
}

/// Re-export the vote ledger core
pub mod ledger {
    pub use tally_ledger::*;
}

#[cfg(test)]
mod tests {
    #[test]
    fn version_is_available() {
        assert!(!super::version::VERSION.is_empty());
    }
}
