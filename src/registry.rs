//! Registry of issued principal names.
//!
//! Issuance must refuse a name that was already handed out, including by an
//! earlier run of the process, so the issuer only sees this trait. The
//! filesystem store implements it by looking at the keys it holds.

use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::error::Error;

/// Read access to the set of principal names already issued.
pub trait NameRegistry: Send + Sync {
    /// Whether `principal` has been issued before.
    fn is_registered(&self, principal: &str) -> Result<bool, Error>;
}

impl<R: NameRegistry + ?Sized> NameRegistry for &R {
    fn is_registered(&self, principal: &str) -> Result<bool, Error> {
        (**self).is_registered(principal)
    }
}

impl<R: NameRegistry + ?Sized> NameRegistry for std::sync::Arc<R> {
    fn is_registered(&self, principal: &str) -> Result<bool, Error> {
        (**self).is_registered(principal)
    }
}

/// Append-only in-memory registry.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    names: RwLock<BTreeSet<String>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a name. Returns `false` if it was already present.
    pub fn register(&self, principal: &str) -> bool {
        self.names
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(principal.to_string())
    }

    pub fn len(&self) -> usize {
        self.names
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NameRegistry for InMemoryRegistry {
    fn is_registered(&self, principal: &str) -> Result<bool, Error> {
        Ok(self
            .names
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(principal))
    }
}
