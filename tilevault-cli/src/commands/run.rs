//! `tilevault run` - plan pending releases and execute the plan.

use super::{pipeline_env, planner_from_env};
use crate::error::CliError;
use std::time::Instant;
use tilevault::exec::exec_plan;
use tilevault::plan::display_plan;
use tracing::info;

pub fn run() -> Result<(), CliError> {
    let start = Instant::now();
    let env_config = pipeline_env();
    let planner = planner_from_env(&env_config)?;

    let jobs = planner.plan_daily()?;
    display_plan(&jobs);
    exec_plan(
        &jobs,
        &env_config.work_dir,
        &env_config.done_dir,
        env_config.tmp_dir.as_deref(),
    )?;

    info!(elapsed = ?start.elapsed(), "All done");
    Ok(())
}
