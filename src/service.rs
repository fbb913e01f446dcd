//! One-stop facade over the issuer, the store and a single session.
//!
//! Front ends (the CLI, the task runner) talk to a [`PkiService`] rather than
//! wiring the parts together themselves. It is `Sync`; the session sits
//! behind a mutex so concurrent callers see one consistent login state.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::Config;
use crate::error::Error;
use crate::issuer::{CollisionPolicy, KeyCertIssuer};
use crate::session::Session;
use crate::signer::SignatureRecord;
use crate::store::PkiStore;
use crate::types::artifacts::{IssuedPaths, SignedArtifacts, SystemStatus};
use crate::verification::{self, VerificationResult};

/// A signature together with where its artifacts were stored.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    pub record: SignatureRecord,
    pub artifacts: SignedArtifacts,
}

pub struct PkiService {
    store: Arc<PkiStore>,
    issuer: KeyCertIssuer<Arc<PkiStore>>,
    session: Mutex<Session>,
}

impl PkiService {
    pub fn new(store: PkiStore, policy: CollisionPolicy) -> Self {
        let store = Arc::new(store);
        Self {
            issuer: KeyCertIssuer::new(Arc::clone(&store)).with_policy(policy),
            store,
            session: Mutex::new(Session::new()),
        }
    }

    /// Open the store under `config.data_dir`.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let store = PkiStore::open(&config.data_dir)?;
        Ok(Self::new(store, config.collision_policy))
    }

    pub fn store(&self) -> &PkiStore {
        &self.store
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.issuer.policy()
    }

    /// Issue a key pair and certificate for `principal` and persist them.
    pub fn register(&self, principal: &str) -> Result<IssuedPaths, Error> {
        let identity = self.issuer.issue(principal)?;
        self.store.save_identity(&identity, self.policy())
    }

    /// Log in with a private key file and a certificate file.
    pub fn login_files(&self, private_key: &Path, certificate: &Path) -> Result<String, Error> {
        let key = zeroize::Zeroizing::new(std::fs::read(private_key)?);
        let cert = std::fs::read(certificate)?;
        let mut session = self.session();
        session.login(&key, &cert).map(str::to_string)
    }

    /// Log in as a principal registered in the store.
    pub fn login_principal(&self, principal: &str) -> Result<String, Error> {
        let stored = self.store.load_identity(principal)?;
        let mut session = self.session();
        session
            .login(&stored.private_key_pem, &stored.certificate_pem)
            .map(str::to_string)
    }

    pub fn logout(&self) -> Option<String> {
        self.session().logout()
    }

    pub fn current_principal(&self) -> Option<String> {
        self.session().principal().map(str::to_string)
    }

    /// Sign `document` under the current session and store the artifacts
    /// under `name`.
    pub fn sign_bytes(&self, name: &str, document: &[u8]) -> Result<SignedDocument, Error> {
        let record = self.session().sign(document)?;
        let artifacts = self.store.save_signed_document(name, document, &record)?;
        Ok(SignedDocument { record, artifacts })
    }

    /// Sign the file at `path`, storing a copy under its file name.
    pub fn sign_file(&self, path: &Path) -> Result<SignedDocument, Error> {
        if !self.session().is_logged_in() {
            return Err(Error::InvalidState);
        }
        let document = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.sign_bytes(&name, &document)
    }

    pub fn verify_bytes(
        &self,
        document: &[u8],
        signature: &[u8],
        certificate: &[u8],
    ) -> Result<VerificationResult, Error> {
        verification::verify(document, signature, certificate)
    }

    pub fn verify_files(
        &self,
        document: &Path,
        signature: &Path,
        certificate: &Path,
    ) -> Result<VerificationResult, Error> {
        let document = std::fs::read(document)?;
        let signature = std::fs::read(signature)?;
        let certificate = std::fs::read(certificate)?;
        self.verify_bytes(&document, &signature, &certificate)
    }

    /// Store counts plus the logged-in principal.
    pub fn status(&self) -> Result<SystemStatus, Error> {
        let mut status = self.store.status()?;
        status.current_principal = self.current_principal();
        Ok(status)
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
