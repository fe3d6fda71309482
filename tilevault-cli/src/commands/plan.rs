//! `tilevault plan` - print what would be processed, without running it.

use super::{pipeline_env, planner_from_env};
use crate::error::CliError;
use tilevault::plan::display_plan;

pub fn run(all_pages: bool) -> Result<(), CliError> {
    let env_config = pipeline_env();
    let planner = planner_from_env(&env_config)?;
    let jobs = if all_pages {
        planner.plan_all()?
    } else {
        planner.plan_daily()?
    };
    display_plan(&jobs);
    Ok(())
}
