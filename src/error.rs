use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid principal name '{0}': only ASCII letters and digits are allowed")]
    InvalidName(String),

    #[error("Principal '{0}' has already been issued")]
    NameCollision(String),

    #[error("Malformed private key: {0}")]
    MalformedKey(String),

    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("No active session: log in before signing")]
    InvalidState,

    #[error("Private key does not match the certificate of '{0}'")]
    KeyCertMismatch(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Which branch of the error taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidName(_)
            | Error::NameCollision(_)
            | Error::MalformedKey(_)
            | Error::MalformedCertificate(_)
            | Error::MalformedSignature(_)
            | Error::Config(_) => ErrorKind::InputValidation,
            Error::InvalidState | Error::KeyCertMismatch(_) => ErrorKind::StateViolation,
            Error::Crypto(_) => ErrorKind::CryptoFailure,
            Error::Json(_) | Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Input and state errors can be fixed by the caller and retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InputValidation | ErrorKind::StateViolation
        )
    }
}

impl From<crate::crypto::Error> for Error {
    fn from(err: crate::crypto::Error) -> Self {
        match err {
            crate::crypto::Error::Pkcs8(e) => Error::MalformedKey(e.to_string()),
            crate::crypto::Error::Pkcs1(e) => Error::MalformedKey(e.to_string()),
            crate::crypto::Error::Spki(e) => Error::MalformedKey(e.to_string()),
            crate::crypto::Error::InvalidKey(msg) => Error::MalformedKey(msg),
            crate::crypto::Error::KeyTooSmall(bits) => {
                Error::MalformedKey(format!("{} bit modulus is too small for RSA-PSS", bits))
            }
            crate::crypto::Error::Rsa(e) => Error::Crypto(e.to_string()),
            crate::crypto::Error::Signature(msg) => Error::Crypto(msg),
        }
    }
}

impl From<x509_cert::der::Error> for Error {
    fn from(err: x509_cert::der::Error) -> Self {
        Error::MalformedCertificate(err.to_string())
    }
}

impl From<x509_cert::builder::Error> for Error {
    fn from(err: x509_cert::builder::Error) -> Self {
        Error::Crypto(format!("certificate builder: {}", err))
    }
}

/// Error taxonomy used by callers to decide remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "INPUT_VALIDATION")]
    InputValidation,
    #[serde(rename = "STATE_VIOLATION")]
    StateViolation,
    #[serde(rename = "CRYPTO_FAILURE")]
    CryptoFailure,
    #[serde(rename = "IO")]
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InputValidation => "INPUT_VALIDATION",
            ErrorKind::StateViolation => "STATE_VIOLATION",
            ErrorKind::CryptoFailure => "CRYPTO_FAILURE",
            ErrorKind::Io => "IO",
        };
        write!(f, "{}", s)
    }
}
