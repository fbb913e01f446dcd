//! # docseal
//!
//! Command-line front end: register users, sign documents, verify
//! signatures.

#![forbid(unsafe_code)]

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::runtime::Handle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{emit, Cli, Command, OutputFormat, SignArgs};
use docseal::certificate::IdentityCertificate;
use docseal::config::Config;
use docseal::issuer::CollisionPolicy;
use docseal::service::PkiService;
use docseal::tasks::{TaskEvent, TaskRunner};

/// Exit status for a signature that parsed but did not verify.
const EXIT_INVALID: u8 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Command::Register {
        overwrite: true, ..
    } = cli.command
    {
        config.collision_policy = CollisionPolicy::Overwrite;
    }

    let service = Arc::new(PkiService::from_config(&config).with_context(|| {
        format!("failed to open data directory {}", config.data_dir.display())
    })?);
    let (runner, mut events) = TaskRunner::new(Arc::clone(&service), Handle::current());
    let format = cli.output;

    match cli.command {
        Command::Register { name, .. } => {
            runner.register(name);
        }
        Command::Sign(args) => {
            login(&service, &args)?;
            runner.sign_file(args.document);
        }
        Command::Verify {
            document,
            signature,
            certificate,
        } => {
            runner.verify_files(document, signature, certificate);
        }
        Command::Status => {
            let status = service.status()?;
            emit(format, &status, &status.to_string())?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::ShowCert { certificate } => {
            let bytes = std::fs::read(&certificate)
                .with_context(|| format!("failed to read {}", certificate.display()))?;
            let info = IdentityCertificate::parse(&bytes)?.info()?;
            let text = format!(
                "Subject: {}\nIssuer: {}\nSerial: {}\nValid: {} to {}\nKey: {}",
                info.subject,
                info.issuer,
                info.serial_number,
                info.not_before,
                info.not_after,
                info.key_id
            );
            emit(format, &info, &text)?;
            return Ok(ExitCode::SUCCESS);
        }
    }

    let event = events
        .recv()
        .await
        .context("background task ended without reporting")?;
    report(event, format)
}

fn login(service: &PkiService, args: &SignArgs) -> anyhow::Result<()> {
    let principal = match (&args.principal, &args.key, &args.cert) {
        (Some(principal), _, _) => service.login_principal(principal)?,
        (None, Some(key), Some(cert)) => service.login_files(key, cert)?,
        _ => anyhow::bail!("either --as or both --key and --cert are required"),
    };
    tracing::debug!(%principal, "session ready");
    Ok(())
}

fn report(event: TaskEvent, format: OutputFormat) -> anyhow::Result<ExitCode> {
    match event {
        TaskEvent::Registered { result, .. } => {
            let paths = result?;
            let text = format!(
                "Registered {}\n  private key: {}\n  public key:  {}\n  certificate: {}",
                paths.principal,
                paths.private_key.display(),
                paths.public_key.display(),
                paths.certificate.display()
            );
            emit(format, &paths, &text)?;
        }
        TaskEvent::Signed { result, .. } => {
            let signed = result?;
            let report = signed.record.report()?;
            let text = format!(
                "Signed {} as {}\n  document:    {}\n  signature:   {}\n  certificate: {}",
                report.document_digest,
                report.signer.subject,
                signed.artifacts.document.display(),
                signed.artifacts.signature.display(),
                signed.artifacts.certificate.display()
            );
            emit(
                format,
                &serde_json::json!({ "signature": report, "artifacts": signed.artifacts }),
                &text,
            )?;
        }
        TaskEvent::Verified { document, result, .. } => {
            let result = result?;
            let text = match result.invalid_reason() {
                None => format!(
                    "VALID: {} signed by {}",
                    document.display(),
                    result.signer.as_deref().unwrap_or("<unknown>")
                ),
                Some(reason) => format!("INVALID: {} ({})", document.display(), reason),
            };
            emit(format, &result, &text)?;
            if !result.is_valid() {
                return Ok(ExitCode::from(EXIT_INVALID));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
