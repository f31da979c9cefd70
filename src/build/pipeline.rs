//! Build pipeline orchestration.
//!
//! The pipeline runs [`Task::BUILD_ORDER`] strictly in sequence. The first
//! failing stage stops the build; the stages after it are recorded as
//! skipped.

use crate::build::{run_task, BuildContext, BuildResult, Task, TaskResult};
use crate::error::TransformError;
use std::time::Instant;

/// Build pipeline for executing builds.
pub struct BuildPipeline<'a> {
    /// Build context
    context: &'a BuildContext,
}

impl<'a> BuildPipeline<'a> {
    /// Create a new build pipeline.
    pub fn new(context: &'a BuildContext) -> Self {
        Self { context }
    }

    /// Run the full build.
    ///
    /// Returns `Err` only when the project fails its preflight checks;
    /// stage failures are reported inside the [`BuildResult`].
    pub fn build(&self) -> Result<BuildResult, TransformError> {
        let start = Instant::now();
        self.context.preflight()?;

        let mut result = self.execute(&Task::BUILD_ORDER);
        result.total_duration = start.elapsed();
        Ok(result)
    }

    /// Run `tasks` in order, stopping at the first failure.
    pub fn execute(&self, tasks: &[Task]) -> BuildResult {
        let mut result = BuildResult::new();
        let mut failed = false;

        for &task in tasks {
            if failed {
                tracing::debug!(task = %task, "Skipped after earlier failure");
                result.add_result(TaskResult::skipped(task));
                continue;
            }
            let task_result = run_task(self.context, task);
            failed = !task_result.is_success();
            result.add_result(task_result);
        }

        result
    }
}
