//! Shared identities for tests. 2048-bit key generation is slow, so each
//! fixture is issued once per test binary.

use std::sync::OnceLock;

use crate::issuer::{IssuedIdentity, KeyCertIssuer};
use crate::registry::InMemoryRegistry;

fn issue(principal: &str) -> IssuedIdentity {
    KeyCertIssuer::new(InMemoryRegistry::new())
        .issue(principal)
        .expect("fixture issuance")
}

pub fn alice() -> &'static IssuedIdentity {
    static ALICE: OnceLock<IssuedIdentity> = OnceLock::new();
    ALICE.get_or_init(|| issue("alice"))
}

pub fn bob() -> &'static IssuedIdentity {
    static BOB: OnceLock<IssuedIdentity> = OnceLock::new();
    BOB.get_or_init(|| issue("bob"))
}
