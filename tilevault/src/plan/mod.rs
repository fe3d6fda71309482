//! Release planner: decides what to ingest next and whether each job is
//! a full base or a diff.
//!
//! The done directory is the source of truth for what has already been
//! processed. One release is kept per UTC calendar day; the first
//! release of a major version without a base is promoted to base, and
//! later releases of the same major become diffs against it.

use crate::release::{
    processed_file_name, ProcessedVersion, Release, ReleaseError, ReleaseSource,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read done folder: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error("no releases found")]
    NoReleases,

    #[error("incomplete base archive data for major version {0}")]
    IncompleteBase(i32),
}

/// One processed store file found in the done directory.
#[derive(Debug, Clone)]
pub struct DoneEntry {
    pub version: ProcessedVersion,
    pub datetime: DateTime<Utc>,
    pub name: String,
}

/// Per-major view of the done set: the base file plus its diffs.
#[derive(Debug, Clone, Default)]
pub struct DoneMajor {
    pub base: Option<DoneEntry>,
    pub diffs: Vec<DoneEntry>,
}

/// Everything the planner knows about prior runs.
#[derive(Debug, Default)]
pub struct DoneSet {
    pub latest: Option<DoneEntry>,
    /// UTC calendar days already covered.
    pub dates: HashSet<NaiveDate>,
    pub majors: HashMap<i32, DoneMajor>,
}

impl DoneSet {
    /// Scans a done directory, ignoring subdirectories and files that do
    /// not look like processed stores.
    pub fn scan(dir: &Path) -> Result<Self, PlanError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(Self::from_names(names))
    }

    /// Builds the done set from bare file names.
    pub fn from_names<I: IntoIterator<Item = String>>(names: I) -> Self {
        let mut done = DoneSet::default();
        for name in names {
            let Some(entry) = parse_done_name(&name) else {
                continue;
            };

            if done
                .latest
                .as_ref()
                .map(|l| entry.datetime > l.datetime)
                .unwrap_or(true)
            {
                done.latest = Some(entry.clone());
            }
            done.dates.insert(entry.datetime.date_naive());

            let major = done.majors.entry(entry.version.major).or_default();
            if entry.version.is_base {
                major.base = Some(entry);
            } else {
                major.diffs.push(entry);
            }
        }
        done
    }
}

/// Parses `v<version>_<YYYY-MM-DDTHH>.db`; `None` for anything else.
fn parse_done_name(name: &str) -> Option<DoneEntry> {
    let body = name.strip_suffix(".db")?;
    if !body.starts_with('v') {
        return None;
    }
    let (version_part, datetime_part) = body.split_once('_')?;
    let version = version_part.parse().ok()?;
    let datetime = parse_hour_stamp(datetime_part)?;
    Some(DoneEntry {
        version,
        datetime,
        name: name.to_string(),
    })
}

/// Parses the `YYYY-MM-DDTHH` stamp used in processed file names.
fn parse_hour_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    let (date_part, hour_part) = stamp.split_once('T')?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    let hour: u32 = hour_part.parse().ok()?;
    let naive = date.and_hms_opt(hour, 0, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

/// One planned unit of work, in plan order.
#[derive(Debug, Clone)]
pub struct PlanJob {
    pub is_diff: bool,
    /// File name of the base store in the done directory; empty for a
    /// full base job.
    pub base: String,
    pub release: Release,
    pub processed_file: String,
}

/// Turns the available releases into an ordered job list.
///
/// Releases are processed oldest-first so that a promoted base lands
/// before the diffs that point at it. Days already done, or claimed by
/// an earlier job in this plan, are skipped.
pub fn make_jobs(mut releases: Vec<Release>, done: &DoneSet) -> Result<Vec<PlanJob>, PlanError> {
    releases.sort_by_key(|r| r.datetime);

    let mut jobs = Vec::new();
    let mut new_days: HashSet<NaiveDate> = HashSet::new();
    let mut new_bases: HashMap<i32, String> = HashMap::new();

    for release in releases {
        let day = release.datetime.date_naive();
        if new_days.contains(&day) || done.dates.contains(&day) {
            continue;
        }

        let mut is_diff = false;
        let mut base_name = String::new();
        if let Some(major) = done.majors.get(&release.version.major) {
            let base = major
                .base
                .as_ref()
                .ok_or(PlanError::IncompleteBase(release.version.major))?;
            is_diff = true;
            base_name = base.name.clone();
        }
        if let Some(planned) = new_bases.get(&release.version.major) {
            is_diff = true;
            base_name = planned.clone();
        }

        let version = if is_diff {
            release.version
        } else {
            release.version.as_base()
        };
        let processed_file = processed_file_name(version, release.datetime);
        if !is_diff {
            new_bases.insert(version.major, processed_file.clone());
        }

        new_days.insert(day);
        jobs.push(PlanJob {
            is_diff,
            base: base_name,
            release,
            processed_file,
        });
    }

    Ok(jobs)
}

/// Plans work against a release source and a done directory.
pub struct Planner {
    done_dir: PathBuf,
    source: Box<dyn ReleaseSource>,
}

impl Planner {
    pub fn new(done_dir: PathBuf, source: Box<dyn ReleaseSource>) -> Self {
        Self { done_dir, source }
    }

    /// Plans jobs for every available release, across all pages.
    pub fn plan_all(&self) -> Result<Vec<PlanJob>, PlanError> {
        self.plan(true)
    }

    /// Plans jobs from the current page of releases only; the periodic
    /// entry point.
    pub fn plan_daily(&self) -> Result<Vec<PlanJob>, PlanError> {
        self.plan(false)
    }

    fn plan(&self, all_pages: bool) -> Result<Vec<PlanJob>, PlanError> {
        let done = DoneSet::scan(&self.done_dir)?;
        let releases = self.source.list(all_pages)?;
        if releases.is_empty() {
            return Err(PlanError::NoReleases);
        }
        make_jobs(releases, &done)
    }

    /// Plans a single full job for the newest release, whether or not it
    /// has been processed before.
    pub fn plan_latest(&self) -> Result<Vec<PlanJob>, PlanError> {
        let releases = self.source.list(false)?;
        let latest = releases.into_iter().next().ok_or(PlanError::NoReleases)?;
        let processed_file = processed_file_name(latest.version, latest.datetime);
        Ok(vec![PlanJob {
            is_diff: false,
            base: String::new(),
            release: latest,
            processed_file,
        }])
    }
}

/// Logs a one-line summary per planned job.
pub fn display_plan(jobs: &[PlanJob]) {
    info!(jobs = jobs.len(), "planned jobs");
    for job in jobs {
        if job.is_diff {
            info!(file = %job.processed_file, base = %job.base, "job: DIFF");
        } else {
            info!(file = %job.processed_file, "job: FULL");
        }
    }
}
