//! Tilevault - archive-to-pyramid tile pipeline
//!
//! This library ingests hourly map-tile release archives (PNG leaves at a
//! fixed base zoom), recolours them to a fixed 64-entry palette, compacts
//! them into SQLite tile stores (optionally as per-pixel diffs against an
//! earlier base store), builds a zoom pyramid by recursive 2x2 reduction,
//! and serves the result over HTTP.
//!
//! # High-Level Flow
//!
//! ```ignore
//! use tilevault::plan::Planner;
//! use tilevault::release::GithubReleaseSource;
//!
//! let source = GithubReleaseSource::new(&archives_url, token)?;
//! let planner = Planner::new(done_dir, Box::new(source));
//! let jobs = planner.plan_daily()?;
//! tilevault::exec::exec_plan(&jobs, &work_dir, &done_dir)?;
//! ```

pub mod archive;
pub mod coord;
pub mod exec;
pub mod ingest;
pub mod logging;
pub mod palette;
pub mod plan;
pub mod pyramid;
pub mod release;
pub mod server;
pub mod store;

/// Version of the tilevault library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
