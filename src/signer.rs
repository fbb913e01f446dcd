//! Detached document signatures.
//!
//! Documents are opaque bytes: the SHA-256 digest of the exact content is
//! signed with RSA-PSS. Two signatures over the same document differ, and both
//! verify.

use std::io::Read;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::certificate::IdentityCertificate;
use crate::crypto::{self, DIGEST_LEN};
use crate::error::Error;
use crate::types::identity::CertificateInfo;

/// Digest and signature bytes from one sign operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    pub document_digest: [u8; DIGEST_LEN],
    pub signature: Vec<u8>,
}

impl DetachedSignature {
    pub fn digest_hex(&self) -> String {
        hex::encode(self.document_digest)
    }
}

/// A detached signature bound to the certificate it was made under.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureRecord {
    pub detached: DetachedSignature,
    pub signer_certificate: IdentityCertificate,
    pub signed_at: DateTime<Utc>,
}

impl SignatureRecord {
    pub fn signature_bytes(&self) -> &[u8] {
        &self.detached.signature
    }

    pub fn document_digest(&self) -> &[u8; DIGEST_LEN] {
        &self.detached.document_digest
    }

    /// JSON-friendly view of the record.
    pub fn report(&self) -> Result<SignatureReport, Error> {
        Ok(SignatureReport {
            document_digest: format!("sha256:{}", self.detached.digest_hex()),
            signature: general_purpose::STANDARD.encode(&self.detached.signature),
            signed_at: self.signed_at,
            signer: self.signer_certificate.info()?,
        })
    }
}

/// Serializable form of a [`SignatureRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureReport {
    /// "sha256:<hex>" of the signed document
    pub document_digest: String,
    /// Base64-encoded signature
    pub signature: String,
    pub signed_at: DateTime<Utc>,
    pub signer: CertificateInfo,
}

/// Sign the full byte content of a document.
///
/// # Errors
///
/// [`Error::MalformedKey`] if the key cannot hold a PSS encoding,
/// [`Error::Crypto`] if the signature primitive fails.
pub fn sign(document: &[u8], private_key: &RsaPrivateKey) -> Result<DetachedSignature, Error> {
    sign_digest(crypto::digest_document(document), private_key)
}

/// Sign a document read to the end from `reader`.
///
/// # Errors
///
/// [`Error::Io`] if reading fails, otherwise as [`sign`].
pub fn sign_reader<R: Read>(
    mut reader: R,
    private_key: &RsaPrivateKey,
) -> Result<DetachedSignature, Error> {
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    sign_digest(hasher.finalize().into(), private_key)
}

fn sign_digest(
    document_digest: [u8; DIGEST_LEN],
    private_key: &RsaPrivateKey,
) -> Result<DetachedSignature, Error> {
    let signature = crypto::pss_sign_digest(private_key, &document_digest)?;
    tracing::debug!(
        digest = %hex::encode(document_digest),
        len = signature.len(),
        "signed document digest"
    );
    Ok(DetachedSignature {
        document_digest,
        signature,
    })
}
