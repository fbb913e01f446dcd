//! Self-signed X.509 identity certificates.
//!
//! Every certificate issued here names the same principal as subject and
//! issuer, carries the principal's RSA public key and is signed with the
//! matching private key (sha256WithRSAEncryption). Nothing chains to it and
//! nothing above it is checked: a parseable certificate is taken at face
//! value.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, SubsecRound, Utc};
use rand::{rngs::OsRng, RngCore};
use rsa::{
    pkcs1v15,
    pkcs8::{DecodePublicKey, EncodePublicKey},
    signature::Verifier,
    RsaPrivateKey, RsaPublicKey,
};
use sha2::Sha256;
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    der::{
        asn1::{GeneralizedTime, ObjectIdentifier, UtcTime},
        pem::LineEnding,
        Decode, DecodePem, Encode, EncodePem, Tag, Tagged,
    },
    name::Name,
    serial_number::SerialNumber,
    spki::SubjectPublicKeyInfoOwned,
    time::{Time, Validity},
    Certificate,
};

use crate::crypto;
use crate::error::Error;
use crate::types::identity::CertificateInfo;

/// Days between notBefore and notAfter.
pub const VALIDITY_DAYS: i64 = 365;

/// id-at-commonName
const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Fixed attributes placed around the principal's common name.
const ORGANIZATION: &str = "PKI System";
const LOCALITY: &str = "City";
const STATE: &str = "State";
const COUNTRY: &str = "US";

/// Position of `now` relative to a certificate's validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityStatus {
    Valid,
    NotYetValid,
    Expired,
}

/// A parsed certificate together with its RSA subject key.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityCertificate {
    inner: Certificate,
    public_key: RsaPublicKey,
}

impl IdentityCertificate {
    /// Build and sign a self-signed certificate for `principal`, valid from
    /// `issued_at` (truncated to whole seconds) for [`VALIDITY_DAYS`].
    pub fn build_self_signed(
        principal: &str,
        private_key: &RsaPrivateKey,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let subject = Name::from_str(&distinguished_name(principal))
            .map_err(|e| Error::Crypto(format!("cannot encode subject name: {}", e)))?;
        let serial_number = random_serial_number()?;
        let validity = validity_window(issued_at)?;

        let public_key = private_key.to_public_key();
        let spki_der = public_key
            .to_public_key_der()
            .map_err(crypto::Error::from)?;
        let spki = SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes())
            .map_err(|e| Error::Crypto(format!("cannot encode subject key: {}", e)))?;

        let signer = pkcs1v15::SigningKey::<Sha256>::new(private_key.clone());
        let profile = Profile::Leaf {
            issuer: subject.clone(),
            enable_key_agreement: false,
            enable_key_encipherment: false,
        };
        let builder =
            CertificateBuilder::new(profile, serial_number, validity, subject, spki, &signer)?;
        let inner = builder.build::<pkcs1v15::Signature>()?;

        Ok(Self { inner, public_key })
    }

    /// Parse a certificate from PEM or DER bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCertificate`] if the bytes are not a
    /// certificate or its subject key is not RSA.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let looks_like_pem = bytes
            .iter()
            .skip_while(|b| b.is_ascii_whitespace())
            .take(5)
            .eq(b"-----".iter());
        let inner = if looks_like_pem {
            Certificate::from_pem(bytes)?
        } else {
            Certificate::from_der(bytes)?
        };
        Self::from_x509(inner)
    }

    /// Parse a PEM-encoded certificate.
    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        Self::from_x509(Certificate::from_pem(pem.as_bytes())?)
    }

    fn from_x509(inner: Certificate) -> Result<Self, Error> {
        let spki_der = inner.tbs_certificate.subject_public_key_info.to_der()?;
        let public_key = RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| Error::MalformedCertificate(format!("subject key is not RSA: {}", e)))?;
        Ok(Self { inner, public_key })
    }

    pub fn to_pem(&self) -> Result<String, Error> {
        Ok(self.inner.to_pem(LineEnding::LF)?)
    }

    pub fn to_der(&self) -> Result<Vec<u8>, Error> {
        Ok(self.inner.to_der()?)
    }

    pub fn as_x509(&self) -> &Certificate {
        &self.inner
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn subject_common_name(&self) -> Option<String> {
        common_name(&self.inner.tbs_certificate.subject)
    }

    pub fn issuer_common_name(&self) -> Option<String> {
        common_name(&self.inner.tbs_certificate.issuer)
    }

    /// Issuer and subject distinguished names are identical.
    pub fn is_self_issued(&self) -> bool {
        self.inner.tbs_certificate.issuer == self.inner.tbs_certificate.subject
    }

    /// Check the certificate signature against its own subject key.
    pub fn verify_self_signature(&self) -> bool {
        let Ok(tbs) = self.inner.tbs_certificate.to_der() else {
            return false;
        };
        let Some(raw) = self.inner.signature.as_bytes() else {
            return false;
        };
        let Ok(signature) = pkcs1v15::Signature::try_from(raw) else {
            return false;
        };
        pkcs1v15::VerifyingKey::<Sha256>::new(self.public_key.clone())
            .verify(&tbs, &signature)
            .is_ok()
    }

    /// Serial number as lowercase hex.
    pub fn serial_hex(&self) -> String {
        hex::encode(self.inner.tbs_certificate.serial_number.as_bytes())
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        from_x509_time(&self.inner.tbs_certificate.validity.not_before)
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        from_x509_time(&self.inner.tbs_certificate.validity.not_after)
    }

    pub fn validity_status(&self, now: DateTime<Utc>) -> ValidityStatus {
        if now < self.not_before() {
            ValidityStatus::NotYetValid
        } else if now > self.not_after() {
            ValidityStatus::Expired
        } else {
            ValidityStatus::Valid
        }
    }

    /// Serializable summary for reports.
    pub fn info(&self) -> Result<CertificateInfo, Error> {
        Ok(CertificateInfo {
            subject: self.subject_common_name().unwrap_or_default(),
            issuer: self.issuer_common_name().unwrap_or_default(),
            serial_number: self.serial_hex(),
            not_before: self.not_before(),
            not_after: self.not_after(),
            key_id: crypto::calculate_key_id(&self.public_key)?,
            self_signed: self.is_self_issued() && self.verify_self_signature(),
        })
    }
}

fn distinguished_name(principal: &str) -> String {
    format!(
        "CN={},O={},L={},ST={},C={}",
        principal, ORGANIZATION, LOCALITY, STATE, COUNTRY
    )
}

/// 127 random bits, always positive and always 16 octets long.
fn random_serial_number() -> Result<SerialNumber, Error> {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes[0] = (bytes[0] & 0x7f) | 0x40;
    SerialNumber::new(&bytes).map_err(|e| Error::Crypto(format!("serial number: {}", e)))
}

fn validity_window(issued_at: DateTime<Utc>) -> Result<Validity, Error> {
    let not_before = issued_at.trunc_subsecs(0);
    let not_after = not_before + chrono::Duration::days(VALIDITY_DAYS);
    Ok(Validity {
        not_before: to_x509_time(not_before)?,
        not_after: to_x509_time(not_after)?,
    })
}

/// RFC 5280: UTCTime through 2049, GeneralizedTime from 2050 on.
fn to_x509_time(time: DateTime<Utc>) -> Result<Time, Error> {
    let secs = u64::try_from(time.timestamp())
        .map_err(|_| Error::Crypto(format!("time before 1970: {}", time)))?;
    let since_epoch = Duration::from_secs(secs);
    let encoded = if time.year() < 2050 {
        UtcTime::from_unix_duration(since_epoch).map(Time::UtcTime)
    } else {
        GeneralizedTime::from_unix_duration(since_epoch).map(Time::GeneralTime)
    };
    encoded.map_err(|e| Error::Crypto(format!("cannot encode {}: {}", time, e)))
}

fn from_x509_time(time: &Time) -> DateTime<Utc> {
    let secs = time.to_unix_duration().as_secs();
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn common_name(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == COMMON_NAME)
        .filter(|atv| {
            matches!(
                atv.value.tag(),
                Tag::Utf8String | Tag::PrintableString | Tag::Ia5String
            )
        })
        .and_then(|atv| std::str::from_utf8(atv.value.value()).ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use chrono::TimeZone;

    #[test]
    fn test_subject_equals_issuer() {
        let cert = &testutil::alice().certificate;
        assert_eq!(cert.subject_common_name().as_deref(), Some("alice"));
        assert_eq!(cert.issuer_common_name().as_deref(), Some("alice"));
        assert!(cert.is_self_issued());
        assert!(cert.verify_self_signature());
    }

    #[test]
    fn test_validity_window_is_one_year() {
        let cert = &testutil::alice().certificate;
        assert_eq!(
            cert.not_after() - cert.not_before(),
            chrono::Duration::days(VALIDITY_DAYS)
        );
        assert_eq!(cert.validity_status(Utc::now()), ValidityStatus::Valid);
        assert_eq!(
            cert.validity_status(cert.not_before() - chrono::Duration::seconds(1)),
            ValidityStatus::NotYetValid
        );
        assert_eq!(
            cert.validity_status(cert.not_after() + chrono::Duration::seconds(1)),
            ValidityStatus::Expired
        );
    }

    #[test]
    fn test_pem_and_der_roundtrip() {
        let cert = &testutil::alice().certificate;
        let pem = cert.to_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));

        let from_pem = IdentityCertificate::parse(pem.as_bytes()).unwrap();
        let from_der = IdentityCertificate::parse(&cert.to_der().unwrap()).unwrap();
        assert_eq!(&from_pem, cert);
        assert_eq!(&from_der, cert);
        assert_eq!(from_pem.public_key(), &testutil::alice().public_key);
    }

    #[test]
    fn test_serial_numbers_differ() {
        let alice = &testutil::alice().certificate;
        let bob = &testutil::bob().certificate;
        assert_eq!(alice.serial_hex().len(), 32);
        assert_ne!(alice.serial_hex(), bob.serial_hex());
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = IdentityCertificate::parse(b"definitely not a certificate").unwrap_err();
        assert!(matches!(err, Error::MalformedCertificate(_)));

        let err = IdentityCertificate::parse(
            b"-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedCertificate(_)));
    }

    #[test]
    fn test_generalized_time_after_2049() {
        let far = Utc.with_ymd_and_hms(2060, 1, 2, 3, 4, 5).unwrap();
        let time = to_x509_time(far).unwrap();
        assert!(matches!(time, Time::GeneralTime(_)));
        assert_eq!(from_x509_time(&time), far);
    }

    #[test]
    fn test_info_summary() {
        let identity = testutil::bob();
        let info = identity.certificate.info().unwrap();
        assert_eq!(info.subject, "bob");
        assert_eq!(info.issuer, "bob");
        assert!(info.self_signed);
        assert_eq!(
            info.key_id,
            crypto::calculate_key_id(&identity.public_key).unwrap()
        );
    }
}
