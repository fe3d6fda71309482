//! Release sources: the external archive feed.
//!
//! A release is an externally published bundle whose name carries the
//! capture datetime. Release sources list them newest-first; anything
//! updated less than an hour ago is filtered out to avoid ingesting
//! bundles still being uploaded.

mod github;
mod version;

pub use github::GithubReleaseSource;
pub use version::{processed_file_name, version_epoch, ProcessedVersion, VersionParseError};

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("invalid releases URL: {0}")]
    BadUrl(String),

    #[error("release API error: {0}")]
    Http(String),

    #[error("invalid release time format: {0}")]
    BadName(String),
}

/// A downloadable asset of a release.
#[derive(Debug, Clone)]
pub struct ReleaseAsset {
    pub name: String,
    pub download_url: String,
}

/// One published archive bundle.
#[derive(Debug, Clone)]
pub struct Release {
    pub name: String,
    pub id: i64,
    pub updated_at: DateTime<Utc>,
    pub assets: Vec<ReleaseAsset>,
    /// Capture time parsed from the release name.
    pub datetime: DateTime<Utc>,
    /// Version derived from the capture time; `is_base` is assigned by
    /// the planner.
    pub version: ProcessedVersion,
}

/// Lists releases newest-first, either the current page only or all
/// pages.
pub trait ReleaseSource {
    fn list(&self, all_pages: bool) -> Result<Vec<Release>, ReleaseError>;
}

/// Parses a release name like `world-2025-11-01T11-47-58.104Z` into its
/// capture datetime.
///
/// The two hyphens between hours/minutes/seconds are rewritten to colons
/// before the RFC 3339 parse; any prefix before the date is dropped.
pub fn parse_release_datetime(name: &str) -> Result<DateTime<Utc>, ReleaseError> {
    let t_index = name
        .find('T')
        .ok_or_else(|| ReleaseError::BadName(name.to_string()))?;
    let date_part = &name[..t_index];
    let time_part = &name[t_index + 1..];

    // Drop an optional non-date prefix: the date is the last 10 bytes
    if date_part.len() < 10 {
        return Err(ReleaseError::BadName(name.to_string()));
    }
    let date_part = &date_part[date_part.len() - 10..];

    let time_part = time_part.replacen('-', ":", 2);
    let full = format!("{date_part}T{time_part}");
    DateTime::parse_from_rfc3339(&full)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ReleaseError::BadName(name.to_string()))
}
