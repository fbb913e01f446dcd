use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Files written for a newly issued principal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuedPaths {
    pub principal: String,
    pub private_key: PathBuf,
    pub public_key: PathBuf,
    pub certificate: PathBuf,
}

/// The three files written for a signed document, sharing one base name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedArtifacts {
    pub document: PathBuf,
    pub signature: PathBuf,
    pub certificate: PathBuf,
}

/// Counts shown by front ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SystemStatus {
    /// Principals with a private key in the store
    pub registered_users: usize,
    /// Signed documents, not counting their signature and certificate copies
    pub signed_documents: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_principal: Option<String>,
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Users: {} | Signed Docs: {}",
            self.registered_users, self.signed_documents
        )?;
        if let Some(ref principal) = self.current_principal {
            write!(f, " | Current: {}", principal)?;
        }
        Ok(())
    }
}
