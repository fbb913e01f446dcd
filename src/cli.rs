//! CLI argument parsing and output.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

/// docseal - issue identity certificates and sign documents.
#[derive(Debug, Parser)]
#[command(name = "docseal")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory holding keys/, certs/ and signed_docs/ (overrides config).
    #[arg(short, long, env = "DOCSEAL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Issue a key pair and self-signed certificate for a new user.
    Register {
        /// Alphanumeric user name.
        name: String,

        /// Replace an existing user's key and certificate.
        #[arg(long)]
        overwrite: bool,
    },

    /// Sign a document and store it with its signature under signed_docs/.
    Sign(SignArgs),

    /// Verify a document against a detached signature and a certificate.
    Verify {
        document: PathBuf,
        signature: PathBuf,
        certificate: PathBuf,
    },

    /// Show registered users and signed documents.
    Status,

    /// Print the details of a certificate.
    ShowCert {
        certificate: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct SignArgs {
    /// Document to sign.
    pub document: PathBuf,

    /// Sign as a user registered in the data directory.
    #[arg(long = "as", value_name = "NAME", conflicts_with_all = ["key", "cert"])]
    pub principal: Option<String>,

    /// Private key file (PEM).
    #[arg(long, requires = "cert", required_unless_present = "principal")]
    pub key: Option<PathBuf>,

    /// Certificate file matching the private key.
    #[arg(long, requires = "key")]
    pub cert: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Print `value` as JSON, or `text` when the format is plain.
pub fn emit<T: Serialize>(format: OutputFormat, value: &T, text: &str) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{}", text),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
