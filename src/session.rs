//! Login state and the signing gate.
//!
//! ```text
//! LoggedOut --login(key, cert)--> LoggedIn(principal)   key and cert must pair up
//! LoggedIn  --logout-----------> LoggedOut              key is dropped and wiped
//! LoggedIn  --sign(doc)--------> LoggedIn
//! ```
//!
//! A `Session` is an ordinary owned value; any number can coexist in one
//! process (tests rely on that), but each holds at most one principal.

use std::fmt;
use std::io::Read;

use chrono::{DateTime, Utc};
use rsa::RsaPrivateKey;

use crate::certificate::IdentityCertificate;
use crate::crypto;
use crate::error::Error;
use crate::signer::{self, SignatureRecord};

/// The private key and certificate held while logged in.
struct ActiveSession {
    principal: String,
    private_key: RsaPrivateKey,
    certificate: IdentityCertificate,
    logged_in_at: DateTime<Utc>,
}

enum SessionState {
    LoggedOut,
    LoggedIn(ActiveSession),
}

/// Single-principal session state machine. Starts logged out.
pub struct Session {
    state: SessionState,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            SessionState::LoggedOut => f.write_str("Session(LoggedOut)"),
            SessionState::LoggedIn(active) => {
                write!(f, "Session(LoggedIn({}))", active.principal)
            }
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::LoggedOut,
        }
    }

    /// Log in with a PEM private key and a PEM or DER certificate.
    ///
    /// The principal is the certificate's subject common name. On any error
    /// the previous state is kept.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedKey`], [`Error::MalformedCertificate`], or
    /// [`Error::KeyCertMismatch`] when the certificate does not carry the
    /// public half of the key.
    pub fn login(&mut self, private_key: &[u8], certificate: &[u8]) -> Result<&str, Error> {
        let private_key = crypto::load_private_key(private_key)?;
        let certificate = IdentityCertificate::parse(certificate)?;
        self.login_with(private_key, certificate)
    }

    /// Log in with an already decoded key and certificate.
    pub fn login_with(
        &mut self,
        private_key: RsaPrivateKey,
        certificate: IdentityCertificate,
    ) -> Result<&str, Error> {
        let principal = certificate.subject_common_name().ok_or_else(|| {
            Error::MalformedCertificate("certificate has no subject common name".to_string())
        })?;

        if !crypto::is_key_pair(&private_key, certificate.public_key()) {
            tracing::warn!(%principal, "login rejected: key does not match certificate");
            return Err(Error::KeyCertMismatch(principal));
        }

        if let SessionState::LoggedIn(ref previous) = self.state {
            tracing::info!(previous = %previous.principal, "replacing active session");
        }
        tracing::info!(%principal, "logged in");

        self.state = SessionState::LoggedIn(ActiveSession {
            principal,
            private_key,
            certificate,
            logged_in_at: Utc::now(),
        });
        Ok(self.principal().unwrap_or_default())
    }

    /// End the session. Returns who was logged in, if anyone.
    pub fn logout(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, SessionState::LoggedOut) {
            SessionState::LoggedOut => None,
            SessionState::LoggedIn(active) => {
                tracing::info!(principal = %active.principal, "logged out");
                // RsaPrivateKey zeroizes itself on drop
                Some(active.principal)
            }
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.state, SessionState::LoggedIn(_))
    }

    pub fn principal(&self) -> Option<&str> {
        self.active().map(|a| a.principal.as_str())
    }

    pub fn certificate(&self) -> Option<&IdentityCertificate> {
        self.active().map(|a| &a.certificate)
    }

    pub fn logged_in_at(&self) -> Option<DateTime<Utc>> {
        self.active().map(|a| a.logged_in_at)
    }

    /// Sign a document with the session's key.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when logged out.
    pub fn sign(&self, document: &[u8]) -> Result<SignatureRecord, Error> {
        let active = self.require_active()?;
        let detached = signer::sign(document, &active.private_key)?;
        Ok(Self::record(active, detached))
    }

    /// Sign a document streamed from `reader`.
    pub fn sign_reader<R: Read>(&self, reader: R) -> Result<SignatureRecord, Error> {
        let active = self.require_active()?;
        let detached = signer::sign_reader(reader, &active.private_key)?;
        Ok(Self::record(active, detached))
    }

    fn record(active: &ActiveSession, detached: signer::DetachedSignature) -> SignatureRecord {
        tracing::info!(
            principal = %active.principal,
            digest = %detached.digest_hex(),
            "document signed"
        );
        SignatureRecord {
            detached,
            signer_certificate: active.certificate.clone(),
            signed_at: Utc::now(),
        }
    }

    fn active(&self) -> Option<&ActiveSession> {
        match &self.state {
            SessionState::LoggedIn(active) => Some(active),
            SessionState::LoggedOut => None,
        }
    }

    fn require_active(&self) -> Result<&ActiveSession, Error> {
        self.active().ok_or(Error::InvalidState)
    }
}
