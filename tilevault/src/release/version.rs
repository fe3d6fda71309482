//! Processed version tags derived from release datetimes.
//!
//! `major` is the week index since 2025-01-01T00Z, `minor` the hour
//! within that week (0..=167). Bases serialise as `v<major>`, diffs as
//! `v<major>.<minor>` with the minor zero-padded to three digits.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Hours in one version week.
const HOURS_PER_WEEK: i64 = 24 * 7;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid processed version: {0}")]
pub struct VersionParseError(pub String);

/// The version epoch: 2025-01-01T00:00:00Z.
pub fn version_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .expect("valid epoch")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessedVersion {
    pub major: i32,
    pub minor: i32,
    pub is_base: bool,
}

impl ProcessedVersion {
    /// Derives the version of a release taken at `datetime`.
    ///
    /// `is_base` starts false; the planner promotes one release per
    /// major to base.
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        let hours = (datetime - version_epoch()).num_hours();
        Self {
            major: (hours / HOURS_PER_WEEK) as i32,
            minor: (hours % HOURS_PER_WEEK) as i32,
            is_base: false,
        }
    }

    /// The base form of this version: minor cleared.
    pub fn as_base(self) -> Self {
        Self {
            major: self.major,
            minor: 0,
            is_base: true,
        }
    }
}

impl fmt::Display for ProcessedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_base {
            write!(f, "v{}", self.major)
        } else {
            write!(f, "v{}.{:03}", self.major, self.minor)
        }
    }
}

impl FromStr for ProcessedVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix('v')
            .ok_or_else(|| VersionParseError(s.to_string()))?;
        let mut parts = body.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| VersionParseError(s.to_string()))?;
        match (parts.next(), parts.next()) {
            (None, _) => Ok(Self {
                major,
                minor: 0,
                is_base: true,
            }),
            (Some(minor), None) => {
                let minor = minor
                    .parse()
                    .map_err(|_| VersionParseError(s.to_string()))?;
                Ok(Self {
                    major,
                    minor,
                    is_base: false,
                })
            }
            _ => Err(VersionParseError(s.to_string())),
        }
    }
}

/// The file name a processed store gets in the done directory.
pub fn processed_file_name(version: ProcessedVersion, datetime: DateTime<Utc>) -> String {
    format!("{}_{}.db", version, datetime.format("%Y-%m-%dT%H"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_version_from_date_examples() {
        assert_eq!(
            ProcessedVersion::from_datetime(utc(2025, 1, 1, 0)).to_string(),
            "v0.000"
        );
        assert_eq!(
            ProcessedVersion::from_datetime(utc(2025, 1, 6, 0)).to_string(),
            "v0.120"
        );
        assert_eq!(
            ProcessedVersion::from_datetime(utc(2025, 1, 7, 0)).to_string(),
            "v0.144"
        );
        assert_eq!(
            ProcessedVersion::from_datetime(utc(2025, 1, 8, 0)).to_string(),
            "v1.000"
        );
    }

    #[test]
    fn test_display_round_trip() {
        let cases = [
            ProcessedVersion {
                major: 0,
                minor: 0,
                is_base: true,
            },
            ProcessedVersion {
                major: 0,
                minor: 24,
                is_base: false,
            },
            ProcessedVersion {
                major: 1,
                minor: 144,
                is_base: false,
            },
            ProcessedVersion {
                major: 37,
                minor: 5,
                is_base: false,
            },
        ];
        for version in cases {
            assert_eq!(version.to_string().parse(), Ok(version));
        }
    }

    #[test]
    fn test_display_format() {
        assert_eq!(
            ProcessedVersion {
                major: 0,
                minor: 24,
                is_base: false
            }
            .to_string(),
            "v0.024"
        );
        assert_eq!(
            ProcessedVersion {
                major: 1,
                minor: 144,
                is_base: false
            }
            .to_string(),
            "v1.144"
        );
        assert_eq!(
            ProcessedVersion {
                major: 3,
                minor: 99,
                is_base: true
            }
            .to_string(),
            "v3"
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<ProcessedVersion>().is_err());
        assert!("1.024".parse::<ProcessedVersion>().is_err());
        assert!("v".parse::<ProcessedVersion>().is_err());
        assert!("vx.024".parse::<ProcessedVersion>().is_err());
        assert!("v1.a".parse::<ProcessedVersion>().is_err());
        assert!("v1.2.3".parse::<ProcessedVersion>().is_err());
    }

    #[test]
    fn test_processed_file_name() {
        let version = ProcessedVersion::from_datetime(utc(2025, 1, 7, 0)).as_base();
        assert_eq!(
            processed_file_name(version, utc(2025, 1, 7, 0)),
            "v0_2025-01-07T00.db"
        );
        let diff = ProcessedVersion::from_datetime(utc(2025, 1, 8, 2));
        assert_eq!(
            processed_file_name(diff, utc(2025, 1, 8, 2)),
            "v1.002_2025-01-08T02.db"
        );
    }

    #[test]
    fn test_file_names_unique_per_version_and_hour() {
        let a = processed_file_name(
            ProcessedVersion::from_datetime(utc(2025, 1, 2, 3)),
            utc(2025, 1, 2, 3),
        );
        let b = processed_file_name(
            ProcessedVersion::from_datetime(utc(2025, 1, 2, 4)),
            utc(2025, 1, 2, 4),
        );
        assert_ne!(a, b);
    }
}
