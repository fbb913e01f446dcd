//! Filesystem store for keys, certificates and signed documents.
//!
//! ```text
//! <root>/keys/<name>_private.pem     PKCS#8 private key (0600 on unix)
//! <root>/keys/<name>_public.pem      SPKI public key
//! <root>/certs/<name>_cert.pem       certificate
//! <root>/signed_docs/<doc>           copy of the document
//! <root>/signed_docs/<doc>.sig       raw signature bytes
//! <root>/signed_docs/<doc>_cert.pem  signer certificate
//! ```
//!
//! Each group of files is written all-or-nothing: every file is staged under
//! a hidden `.partial` name, then renamed into place. Writers are serialized
//! by a mutex; reads go straight to the filesystem.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use zeroize::Zeroizing;

use crate::error::Error;
use crate::issuer::{self, CollisionPolicy, IssuedIdentity};
use crate::registry::NameRegistry;
use crate::signer::SignatureRecord;
use crate::types::artifacts::{IssuedPaths, SignedArtifacts, SystemStatus};

pub const KEYS_DIR: &str = "keys";
pub const CERTS_DIR: &str = "certs";
pub const SIGNED_DOCS_DIR: &str = "signed_docs";

const PRIVATE_KEY_SUFFIX: &str = "_private.pem";
const PUBLIC_KEY_SUFFIX: &str = "_public.pem";
const CERT_SUFFIX: &str = "_cert.pem";
const SIGNATURE_EXT: &str = ".sig";
const STAGING_EXT: &str = ".partial";

/// Raw credential files of one principal, as read back from the store.
pub struct StoredCredentials {
    pub private_key_pem: Zeroizing<Vec<u8>>,
    pub certificate_pem: Vec<u8>,
}

impl std::fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("private_key_pem", &"<redacted>")
            .field("certificate_pem", &self.certificate_pem.len())
            .finish()
    }
}

/// One file of a write group.
struct PendingFile<'a> {
    path: PathBuf,
    contents: &'a [u8],
    secret: bool,
}

#[derive(Debug)]
pub struct PkiStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl PkiStore {
    /// Open a store rooted at `root`, creating its directories if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        for dir in [KEYS_DIR, CERTS_DIR, SIGNED_DOCS_DIR] {
            fs::create_dir_all(root.join(dir))?;
        }
        tracing::debug!(root = %root.display(), "opened store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn private_key_path(&self, principal: &str) -> PathBuf {
        self.root
            .join(KEYS_DIR)
            .join(format!("{}{}", principal, PRIVATE_KEY_SUFFIX))
    }

    pub fn public_key_path(&self, principal: &str) -> PathBuf {
        self.root
            .join(KEYS_DIR)
            .join(format!("{}{}", principal, PUBLIC_KEY_SUFFIX))
    }

    pub fn certificate_path(&self, principal: &str) -> PathBuf {
        self.root
            .join(CERTS_DIR)
            .join(format!("{}{}", principal, CERT_SUFFIX))
    }

    pub fn signed_docs_dir(&self) -> PathBuf {
        self.root.join(SIGNED_DOCS_DIR)
    }

    /// Persist a freshly issued identity.
    ///
    /// The collision check is repeated under the write lock, so two
    /// concurrent registrations of one name cannot both succeed under
    /// [`CollisionPolicy::Reject`].
    pub fn save_identity(
        &self,
        identity: &IssuedIdentity,
        policy: CollisionPolicy,
    ) -> Result<IssuedPaths, Error> {
        let principal = identity.principal.as_str();
        issuer::validate_principal_name(principal)?;

        let private_key_pem = identity.private_key_pem()?;
        let public_key_pem = identity.public_key_pem()?;
        let certificate_pem = identity.certificate_pem()?;

        let paths = IssuedPaths {
            principal: principal.to_string(),
            private_key: self.private_key_path(principal),
            public_key: self.public_key_path(principal),
            certificate: self.certificate_path(principal),
        };

        let _guard = self.lock();
        if policy == CollisionPolicy::Reject && paths.private_key.exists() {
            return Err(Error::NameCollision(principal.to_string()));
        }

        write_group(&[
            PendingFile {
                path: paths.private_key.clone(),
                contents: private_key_pem.as_bytes(),
                secret: true,
            },
            PendingFile {
                path: paths.public_key.clone(),
                contents: public_key_pem.as_bytes(),
                secret: false,
            },
            PendingFile {
                path: paths.certificate.clone(),
                contents: certificate_pem.as_bytes(),
                secret: false,
            },
        ])?;

        tracing::info!(principal, "stored identity");
        Ok(paths)
    }

    /// Read back the private key and certificate of `principal`.
    pub fn load_identity(&self, principal: &str) -> Result<StoredCredentials, Error> {
        issuer::validate_principal_name(principal)?;
        let private_key_pem = Zeroizing::new(fs::read(self.private_key_path(principal))?);
        let certificate_pem = fs::read(self.certificate_path(principal))?;
        Ok(StoredCredentials {
            private_key_pem,
            certificate_pem,
        })
    }

    /// Store a signed document with its signature and signer certificate.
    ///
    /// Only the final component of `name` is used. If the name is taken a
    /// numeric suffix is added (`report.txt` becomes `report-2.txt`); nothing
    /// already stored is overwritten.
    pub fn save_signed_document(
        &self,
        name: &str,
        document: &[u8],
        record: &SignatureRecord,
    ) -> Result<SignedArtifacts, Error> {
        let base = sanitize_document_name(name)?;
        let certificate_pem = record.signer_certificate.to_pem()?;
        let dir = self.signed_docs_dir();

        let _guard = self.lock();
        let base = unique_document_name(&dir, &base);
        let artifacts = SignedArtifacts {
            document: dir.join(&base),
            signature: dir.join(format!("{}{}", base, SIGNATURE_EXT)),
            certificate: dir.join(format!("{}{}", base, CERT_SUFFIX)),
        };

        write_group(&[
            PendingFile {
                path: artifacts.document.clone(),
                contents: document,
                secret: false,
            },
            PendingFile {
                path: artifacts.signature.clone(),
                contents: record.signature_bytes(),
                secret: false,
            },
            PendingFile {
                path: artifacts.certificate.clone(),
                contents: certificate_pem.as_bytes(),
                secret: false,
            },
        ])?;

        tracing::info!(
            document = %artifacts.document.display(),
            "stored signed document"
        );
        Ok(artifacts)
    }

    /// Names of every principal with a private key in the store, sorted.
    pub fn registered_principals(&self) -> Result<Vec<String>, Error> {
        let mut names: Vec<String> = list_file_names(&self.root.join(KEYS_DIR))?
            .into_iter()
            .filter_map(|f| f.strip_suffix(PRIVATE_KEY_SUFFIX).map(str::to_string))
            .filter(|name| issuer::validate_principal_name(name).is_ok())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Registered users and signed documents. `current_principal` is left
    /// empty; the store does not know about sessions.
    pub fn status(&self) -> Result<SystemStatus, Error> {
        let registered_users = self.registered_principals()?.len();

        let docs = list_file_names(&self.signed_docs_dir())?;
        let signed_documents = docs
            .iter()
            .filter(|f| !f.starts_with('.'))
            .filter(|f| docs.contains(&format!("{}{}", f, SIGNATURE_EXT)))
            .count();

        Ok(SystemStatus {
            registered_users,
            signed_documents,
            current_principal: None,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NameRegistry for PkiStore {
    fn is_registered(&self, principal: &str) -> Result<bool, Error> {
        if issuer::validate_principal_name(principal).is_err() {
            return Ok(false);
        }
        Ok(self.private_key_path(principal).exists())
    }
}

fn sanitize_document_name(name: &str) -> Result<String, Error> {
    let file_name = Path::new(name)
        .file_name()
        .and_then(|f| f.to_str())
        .map(|f| f.trim_start_matches('.'))
        .unwrap_or_default();
    if file_name.is_empty() {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(file_name.to_string())
}

fn unique_document_name(dir: &Path, base: &str) -> String {
    let taken = |candidate: &str| {
        dir.join(candidate).exists()
            || dir.join(format!("{}{}", candidate, SIGNATURE_EXT)).exists()
            || dir.join(format!("{}{}", candidate, CERT_SUFFIX)).exists()
    };
    if !taken(base) {
        return base.to_string();
    }

    let (stem, ext) = match base.rfind('.') {
        Some(idx) if idx > 0 => (&base[..idx], &base[idx..]),
        _ => (base, ""),
    };
    let mut n = 2u64;
    loop {
        let candidate = format!("{}-{}{}", stem, n, ext);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn list_file_names(dir: &Path) -> Result<Vec<String>, Error> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}{}", name, STAGING_EXT))
}

fn write_staged(path: &Path, contents: &[u8], secret: bool) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if secret {
        owner_only(&mut options);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(unix)]
fn owner_only(options: &mut fs::OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
}

#[cfg(not(unix))]
fn owner_only(_options: &mut fs::OpenOptions) {}

/// Stage every file, then rename them all into place. On failure every
/// staged or renamed file of the group is removed.
fn write_group(files: &[PendingFile<'_>]) -> Result<(), Error> {
    let staged: Vec<PathBuf> = files.iter().map(|f| staging_path(&f.path)).collect();

    for (file, staging) in files.iter().zip(&staged) {
        tracing::debug!(path = %file.path.display(), "staging file");
        if let Err(e) = write_staged(staging, file.contents, file.secret) {
            rollback(&staged, &[]);
            return Err(e.into());
        }
    }

    let mut committed: Vec<&Path> = Vec::with_capacity(files.len());
    for (file, staging) in files.iter().zip(&staged) {
        if let Err(e) = fs::rename(staging, &file.path) {
            rollback(&staged, &committed);
            return Err(e.into());
        }
        committed.push(&file.path);
    }
    Ok(())
}

fn rollback(staged: &[PathBuf], committed: &[&Path]) {
    tracing::warn!(
        staged = staged.len(),
        committed = committed.len(),
        "rolling back partial write"
    );
    for path in staged.iter().map(PathBuf::as_path).chain(committed.iter().copied()) {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "rollback failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::IdentityCertificate;
    use crate::crypto;
    use crate::session::Session;
    use crate::testutil;

    fn record_for(document: &[u8]) -> SignatureRecord {
        let identity = testutil::alice();
        let mut session = Session::new();
        session
            .login_with(identity.private_key.clone(), identity.certificate.clone())
            .unwrap();
        session.sign(document).unwrap()
    }

    #[test]
    fn test_open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = PkiStore::open(dir.path()).unwrap();
        for sub in [KEYS_DIR, CERTS_DIR, SIGNED_DOCS_DIR] {
            assert!(dir.path().join(sub).is_dir());
        }
        assert_eq!(store.status().unwrap(), SystemStatus::default());
    }

    #[test]
    fn test_save_and_load_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = PkiStore::open(dir.path()).unwrap();
        let identity = testutil::alice();

        let paths = store
            .save_identity(identity, CollisionPolicy::Reject)
            .unwrap();
        assert_eq!(paths.private_key, dir.path().join("keys/alice_private.pem"));
        assert_eq!(paths.public_key, dir.path().join("keys/alice_public.pem"));
        assert_eq!(paths.certificate, dir.path().join("certs/alice_cert.pem"));
        assert!(store.is_registered("alice").unwrap());

        let stored = store.load_identity("alice").unwrap();
        let key = crypto::load_private_key(&stored.private_key_pem).unwrap();
        let cert = IdentityCertificate::parse(&stored.certificate_pem).unwrap();
        assert!(crypto::is_key_pair(&key, cert.public_key()));
        assert_eq!(cert, identity.certificate);
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = PkiStore::open(dir.path()).unwrap();
        let paths = store
            .save_identity(testutil::bob(), CollisionPolicy::Reject)
            .unwrap();
        let mode = fs::metadata(&paths.private_key).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_save_identity_collision() {
        let dir = tempfile::tempdir().unwrap();
        let store = PkiStore::open(dir.path()).unwrap();
        let identity = testutil::alice();
        store.save_identity(identity, CollisionPolicy::Reject).unwrap();

        let err = store
            .save_identity(identity, CollisionPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, Error::NameCollision(_)));
        store
            .save_identity(identity, CollisionPolicy::Overwrite)
            .unwrap();
        assert_eq!(store.registered_principals().unwrap(), vec!["alice"]);
    }

    #[test]
    fn test_concurrent_saves_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = PkiStore::open(dir.path()).unwrap();
        let identity = testutil::alice();

        let results: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| store.save_identity(identity, CollisionPolicy::Reject).is_ok()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(store.status().unwrap().registered_users, 1);
    }

    #[test]
    fn test_load_missing_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = PkiStore::open(dir.path()).unwrap();
        assert!(matches!(store.load_identity("nobody"), Err(Error::Io(_))));
        assert!(matches!(
            store.load_identity("../etc"),
            Err(Error::InvalidName(_))
        ));
    }

    #[test]
    fn test_registry_ignores_invalid_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = PkiStore::open(dir.path()).unwrap();
        assert!(!store.is_registered("../keys/x").unwrap());
        assert!(!store.is_registered("").unwrap());
    }

    #[test]
    fn test_save_signed_document_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = PkiStore::open(dir.path()).unwrap();
        let record = record_for(b"hello world");

        let artifacts = store
            .save_signed_document("/tmp/somewhere/report.txt", b"hello world", &record)
            .unwrap();
        let docs = dir.path().join(SIGNED_DOCS_DIR);
        assert_eq!(artifacts.document, docs.join("report.txt"));
        assert_eq!(artifacts.signature, docs.join("report.txt.sig"));
        assert_eq!(artifacts.certificate, docs.join("report.txt_cert.pem"));

        assert_eq!(fs::read(&artifacts.document).unwrap(), b"hello world");
        assert_eq!(
            fs::read(&artifacts.signature).unwrap(),
            record.signature_bytes()
        );
        let cert = fs::read_to_string(&artifacts.certificate).unwrap();
        assert!(cert.starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn test_signed_documents_are_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = PkiStore::open(dir.path()).unwrap();
        let first = record_for(b"v1");
        let second = record_for(b"v2");

        let a = store.save_signed_document("report.txt", b"v1", &first).unwrap();
        let b = store.save_signed_document("report.txt", b"v2", &second).unwrap();
        let c = store.save_signed_document("report.txt", b"v2", &second).unwrap();

        assert!(a.document.ends_with("report.txt"));
        assert!(b.document.ends_with("report-2.txt"));
        assert!(c.document.ends_with("report-3.txt"));
        assert_eq!(fs::read(&a.document).unwrap(), b"v1");
        assert_eq!(fs::read(&b.signature).unwrap(), second.signature_bytes());
    }

    #[test]
    fn test_unique_name_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes"), b"x").unwrap();
        assert_eq!(unique_document_name(dir.path(), "notes"), "notes-2");
        assert_eq!(unique_document_name(dir.path(), "other"), "other");
    }

    #[test]
    fn test_sanitize_document_name() {
        assert_eq!(sanitize_document_name("a/b/c.txt").unwrap(), "c.txt");
        assert_eq!(sanitize_document_name(".hidden").unwrap(), "hidden");
        assert!(sanitize_document_name("").is_err());
        assert!(sanitize_document_name("..").is_err());
        assert!(sanitize_document_name("/").is_err());
    }

    #[test]
    fn test_status_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = PkiStore::open(dir.path()).unwrap();
        store
            .save_identity(testutil::alice(), CollisionPolicy::Reject)
            .unwrap();
        store
            .save_identity(testutil::bob(), CollisionPolicy::Reject)
            .unwrap();

        let record = record_for(b"doc");
        store.save_signed_document("a.txt", b"doc", &record).unwrap();
        store.save_signed_document("a.txt", b"doc", &record).unwrap();
        store.save_signed_document("b.sig", b"doc", &record).unwrap();
        // stray files are not documents
        fs::write(store.signed_docs_dir().join("loose.txt"), b"x").unwrap();
        fs::write(store.signed_docs_dir().join(".a.txt.partial"), b"x").unwrap();

        let status = store.status().unwrap();
        assert_eq!(status.registered_users, 2);
        assert_eq!(status.signed_documents, 3);
        assert_eq!(status.to_string(), "Users: 2 | Signed Docs: 3");
    }

    #[test]
    fn test_failed_group_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ok.txt");
        let blocked = dir.path().join("missing_dir").join("file.txt");

        let result = write_group(&[
            PendingFile {
                path: target.clone(),
                contents: b"one",
                secret: false,
            },
            PendingFile {
                path: blocked,
                contents: b"two",
                secret: false,
            },
        ]);
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!target.exists());
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn test_failed_rename_rolls_back_committed_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        // a non-empty directory cannot be replaced by a file
        let occupied = dir.path().join("occupied");
        fs::create_dir(&occupied).unwrap();
        fs::write(occupied.join("inner"), b"x").unwrap();

        let result = write_group(&[
            PendingFile {
                path: first.clone(),
                contents: b"one",
                secret: false,
            },
            PendingFile {
                path: occupied.clone(),
                contents: b"two",
                secret: false,
            },
        ]);
        assert!(result.is_err());
        assert!(!first.exists());
        assert!(!staging_path(&occupied).exists());
        assert!(occupied.join("inner").exists());
    }
}
