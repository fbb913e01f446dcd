//! # docseal
//!
//! Self-signed identity certificates and detached document signatures.
//!
//! docseal issues each principal an RSA key pair together with a self-signed
//! X.509 certificate, and uses those keys to sign arbitrary documents. Anyone
//! holding the document, the signature and the signer's certificate can
//! verify it; no session or private key is needed for that.
//!
//! ## Features
//!
//! - **Issuance**: 2048-bit RSA keys (e = 65537) and X.509 v3 certificates
//!   valid for 365 days, one per alphanumeric principal name
//! - **Signing**: SHA-256 digest of the raw bytes, RSA-PSS with MGF1-SHA256
//!   and the maximum salt length
//! - **Verification**: `Valid` / `Invalid(reason)` as values, with expired
//!   certificates reported separately from signature mismatches
//! - **Sessions**: signing is only possible after logging in with a matching
//!   key and certificate
//! - **Storage**: `keys/`, `certs/` and `signed_docs/` on disk, written
//!   all-or-nothing
//!
//! ## Quick Start
//!
//! ```no_run
//! use docseal::issuer::KeyCertIssuer;
//! use docseal::registry::InMemoryRegistry;
//! use docseal::session::Session;
//! use docseal::verification;
//!
//! let issuer = KeyCertIssuer::new(InMemoryRegistry::new());
//! let identity = issuer.issue("alice").unwrap();
//!
//! let mut session = Session::new();
//! session
//!     .login_with(identity.private_key.clone(), identity.certificate.clone())
//!     .unwrap();
//! let record = session.sign(b"hello world").unwrap();
//!
//! let cert_pem = identity.certificate_pem().unwrap();
//! let result =
//!     verification::verify(b"hello world", record.signature_bytes(), cert_pem.as_bytes())
//!         .unwrap();
//! assert!(result.is_valid());
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return `Result<T, Error>`. [`Error::kind`] sorts every
//! error into input validation, state violation, crypto failure or I/O. A
//! signature that does not verify is not an error.

pub mod certificate;
pub mod config;
pub mod crypto;
pub mod error;
pub mod issuer;
pub mod registry;
pub mod service;
pub mod session;
pub mod signer;
pub mod store;
pub mod tasks;
pub mod types;
pub mod verification;

#[cfg(test)]
mod testutil;

pub use certificate::IdentityCertificate;
pub use error::{Error, ErrorKind};
pub use issuer::{CollisionPolicy, IssuedIdentity, KeyCertIssuer};
pub use service::PkiService;
pub use session::Session;
pub use verification::{InvalidReason, VerificationOutcome, VerificationResult};
