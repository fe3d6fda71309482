//! Subcommand implementations.

pub mod ingest;
pub mod merge;
pub mod plan;
pub mod run;
pub mod serve;

use crate::error::CliError;
use std::env;
use std::path::PathBuf;
use tilevault::plan::Planner;
use tilevault::release::GithubReleaseSource;

/// Planner/executor configuration resolved from the environment.
pub struct PipelineEnv {
    pub work_dir: PathBuf,
    pub done_dir: PathBuf,
    pub tmp_dir: Option<PathBuf>,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

/// Reads the pipeline directories from the environment.
pub fn pipeline_env() -> PipelineEnv {
    PipelineEnv {
        work_dir: PathBuf::from(env_or("META_WORK_FOLDER", "./tilevault-work")),
        done_dir: PathBuf::from(env_or("META_DONE_FOLDER", "./tilevault-done")),
        tmp_dir: env::var("META_TMP_FOLDER")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from),
    }
}

/// Builds the planner over the configured release source and done
/// directory.
pub fn planner_from_env(env_config: &PipelineEnv) -> Result<Planner, CliError> {
    let url = env_or(
        "ARCHIVES_URL",
        "https://github.com/murolem/wplace-archives/releases",
    );
    let token = env::var("GITHUB_TOKEN").ok();
    let source = GithubReleaseSource::new(&url, token)?;
    Ok(Planner::new(
        env_config.done_dir.clone(),
        Box::new(source),
    ))
}
