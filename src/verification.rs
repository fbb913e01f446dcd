use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::certificate::{IdentityCertificate, ValidityStatus};
use crate::crypto;
use crate::error::Error;

/// Why a signature did not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    /// Document, signature or key do not belong together.
    #[serde(rename = "SIGNATURE_MISMATCH")]
    SignatureMismatch,
    /// The signer certificate's notAfter has passed.
    #[serde(rename = "CERTIFICATE_EXPIRED")]
    Expired,
    /// The signer certificate's notBefore lies in the future.
    #[serde(rename = "CERTIFICATE_NOT_YET_VALID")]
    NotYetValid,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvalidReason::SignatureMismatch => "SIGNATURE_MISMATCH",
            InvalidReason::Expired => "CERTIFICATE_EXPIRED",
            InvalidReason::NotYetValid => "CERTIFICATE_NOT_YET_VALID",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a verification. Failure is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum VerificationOutcome {
    Valid,
    Invalid(InvalidReason),
}

/// Structured verification result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationResult {
    pub outcome: VerificationOutcome,
    /// Subject common name of the certificate checked against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    pub certificate_serial: String,
    /// "sha256:<hex>" of the document as supplied
    pub document_digest: String,
    pub checked_at: DateTime<Utc>,
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        self.outcome == VerificationOutcome::Valid
    }

    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        match self.outcome {
            VerificationOutcome::Valid => None,
            VerificationOutcome::Invalid(reason) => Some(reason),
        }
    }
}

/// Verify a detached signature over `document` against a certificate given
/// as PEM or DER bytes.
///
/// # Errors
///
/// [`Error::MalformedCertificate`] if the certificate does not parse or does
/// not hold an RSA key, [`Error::MalformedSignature`] if the signature length
/// does not match the key. A signature that simply does not verify is
/// reported through [`VerificationOutcome::Invalid`].
pub fn verify(
    document: &[u8],
    signature: &[u8],
    certificate: &[u8],
) -> Result<VerificationResult, Error> {
    verify_at(document, signature, certificate, Utc::now())
}

/// [`verify`] with an explicit clock for the validity check.
pub fn verify_at(
    document: &[u8],
    signature: &[u8],
    certificate: &[u8],
    now: DateTime<Utc>,
) -> Result<VerificationResult, Error> {
    let certificate = IdentityCertificate::parse(certificate)?;
    verify_with_certificate(document, signature, &certificate, now)
}

/// Verify against an already parsed certificate.
///
/// 1. Check the signature is structurally a PSS signature for this key size
/// 2. Recompute the document digest
/// 3. Verify RSA-PSS over the digest
/// 4. Check the certificate validity window
pub fn verify_with_certificate(
    document: &[u8],
    signature: &[u8],
    certificate: &IdentityCertificate,
    now: DateTime<Utc>,
) -> Result<VerificationResult, Error> {
    let public_key = certificate.public_key();

    // Step 1: structural check
    let expected_len = rsa::traits::PublicKeyParts::size(public_key);
    if signature.len() != expected_len {
        return Err(Error::MalformedSignature(format!(
            "expected {} bytes for this key, got {}",
            expected_len,
            signature.len()
        )));
    }

    // Step 2: digest
    let digest = crypto::digest_document(document);

    // Step 3: signature
    let signature_ok = crypto::pss_verify_digest(public_key, &digest, signature)
        .map_err(|e| Error::MalformedSignature(e.to_string()))?;

    // Step 4: validity window
    let outcome = if !signature_ok {
        VerificationOutcome::Invalid(InvalidReason::SignatureMismatch)
    } else {
        match certificate.validity_status(now) {
            ValidityStatus::Valid => VerificationOutcome::Valid,
            ValidityStatus::Expired => VerificationOutcome::Invalid(InvalidReason::Expired),
            ValidityStatus::NotYetValid => {
                VerificationOutcome::Invalid(InvalidReason::NotYetValid)
            }
        }
    };

    let signer = certificate.subject_common_name();
    tracing::info!(
        signer = signer.as_deref().unwrap_or("<unknown>"),
        outcome = ?outcome,
        "verified document signature"
    );

    Ok(VerificationResult {
        outcome,
        signer,
        certificate_serial: certificate.serial_hex(),
        document_digest: format!("sha256:{}", hex::encode(digest)),
        checked_at: now,
    })
}
