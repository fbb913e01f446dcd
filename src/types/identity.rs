use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of an identity certificate, suitable for display or JSON output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject common name (the principal)
    pub subject: String,
    /// Issuer common name; equal to `subject` for every certificate we issue
    pub issuer: String,
    /// Serial number as lowercase hex
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// SHA-256 fingerprint of the subject public key, "sha256:<hex>"
    pub key_id: String,
    /// Issuer equals subject and the certificate verifies under its own key
    pub self_signed: bool,
}
