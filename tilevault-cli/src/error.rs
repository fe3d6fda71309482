//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent
//! formatting and a non-zero exit code on fatal errors.

use std::fmt;
use std::process;
use tilevault::exec::ExecError;
use tilevault::ingest::IngestError;
use tilevault::plan::PlanError;
use tilevault::pyramid::MergeError;
use tilevault::release::ReleaseError;
use tilevault::server::ServerError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Ingest run failed
    Ingest(IngestError),
    /// Merge run failed
    Merge(MergeError),
    /// Release source misconfigured or unreachable
    Release(ReleaseError),
    /// Planning failed
    Plan(PlanError),
    /// Plan execution failed
    Exec(ExecError),
    /// Tile server failed
    Serve(ServerError),
}

impl CliError {
    /// Exit the process with an error message and a non-zero code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Release(_) = self {
            eprintln!();
            eprintln!("Check ARCHIVES_URL points at a forge releases page, e.g.");
            eprintln!("  https://github.com/owner/repo/releases");
            eprintln!("Set GITHUB_TOKEN to avoid unauthenticated rate limits.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Ingest(e) => write!(f, "Ingest failed: {}", e),
            CliError::Merge(e) => write!(f, "Merge failed: {}", e),
            CliError::Release(e) => write!(f, "Release source error: {}", e),
            CliError::Plan(e) => write!(f, "Planning failed: {}", e),
            CliError::Exec(e) => write!(f, "Plan execution failed: {}", e),
            CliError::Serve(e) => write!(f, "Tile server error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Ingest(e) => Some(e),
            CliError::Merge(e) => Some(e),
            CliError::Release(e) => Some(e),
            CliError::Plan(e) => Some(e),
            CliError::Exec(e) => Some(e),
            CliError::Serve(e) => Some(e),
            CliError::LoggingInit(_) => None,
        }
    }
}

impl From<IngestError> for CliError {
    fn from(e: IngestError) -> Self {
        CliError::Ingest(e)
    }
}

impl From<MergeError> for CliError {
    fn from(e: MergeError) -> Self {
        CliError::Merge(e)
    }
}

impl From<ReleaseError> for CliError {
    fn from(e: ReleaseError) -> Self {
        CliError::Release(e)
    }
}

impl From<PlanError> for CliError {
    fn from(e: PlanError) -> Self {
        CliError::Plan(e)
    }
}

impl From<ExecError> for CliError {
    fn from(e: ExecError) -> Self {
        CliError::Exec(e)
    }
}

impl From<ServerError> for CliError {
    fn from(e: ServerError) -> Self {
        CliError::Serve(e)
    }
}
