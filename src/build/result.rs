//! Build result types.
//!
//! Contains types for representing the outcome of build operations.

use crate::build::Task;
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Task succeeded
    Success,
    /// Task not run because an earlier stage failed
    Skipped,
    /// Task failed; `fatal` marks configuration errors
    Failed { errors: Vec<String>, fatal: bool },
}

impl BuildStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success)
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildStatus::Failed { .. })
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Success => write!(f, "success"),
            BuildStatus::Skipped => write!(f, "skipped"),
            BuildStatus::Failed { errors, .. } => write!(f, "failed: {}", errors.join("; ")),
        }
    }
}

/// Result of running a single task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Task that ran
    pub task: Task,
    /// Outcome
    pub status: BuildStatus,
    /// Files written
    pub outputs: Vec<PathBuf>,
    /// Wall-clock duration
    pub duration: Duration,
}

impl TaskResult {
    /// Create a successful result.
    pub fn success(task: Task, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self { task, status: BuildStatus::Success, outputs, duration }
    }

    /// Create a skipped result.
    pub fn skipped(task: Task) -> Self {
        Self { task, status: BuildStatus::Skipped, outputs: vec![], duration: Duration::ZERO }
    }

    /// Create a failed result; files written before the failure are kept.
    pub fn failed(task: Task, errors: Vec<String>, fatal: bool, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self { task, status: BuildStatus::Failed { errors, fatal }, outputs, duration }
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the task failed on a configuration error.
    pub fn is_fatal(&self) -> bool {
        matches!(self.status, BuildStatus::Failed { fatal: true, .. })
    }
}

/// Result of a complete build run.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// Results for each task, in build order
    pub tasks: Vec<TaskResult>,
    /// Total build duration
    pub total_duration: Duration,
}

impl BuildResult {
    /// Create a new empty build result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task result.
    pub fn add_result(&mut self, result: TaskResult) {
        self.tasks.push(result);
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// Get the number of successful tasks.
    pub fn success_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_success()).count()
    }

    /// Get the number of skipped tasks.
    pub fn skipped_count(&self) -> usize {
        self.tasks.iter().filter(|r| matches!(r.status, BuildStatus::Skipped)).count()
    }

    /// Get the number of failed tasks.
    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Check if the overall build succeeded: every task ran and none failed.
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(TaskResult::is_success)
    }

    /// Get all outputs produced.
    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.tasks.iter().flat_map(|r| r.outputs.iter()).collect()
    }

    /// Get failed task results.
    pub fn failures(&self) -> Vec<&TaskResult> {
        self.tasks.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// Format a summary of the build result.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let success = self.success_count();
        let skipped = self.skipped_count();
        let failed = self.failed_count();
        let total = self.tasks.len();
        let files = self.all_outputs().len();

        if failed > 0 {
            lines.push(format!(
                "Build failed: {} succeeded, {} skipped, {} failed ({} total)",
                success, skipped, failed, total
            ));
            for result in self.failures() {
                if let BuildStatus::Failed { errors, .. } = &result.status {
                    for error in errors.iter().take(5) {
                        lines.push(format!("  - {}: {}", result.task, error));
                    }
                    if errors.len() > 5 {
                        lines.push(format!("  ... and {} more", errors.len() - 5));
                    }
                }
            }
        } else {
            lines.push(format!(
                "Build succeeded: {} tasks, {} files in {:?}",
                success, files, self.total_duration
            ));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(task: Task) -> TaskResult {
        TaskResult::failed(task, vec!["boom".to_string()], false, vec![], Duration::ZERO)
    }

    #[test]
    fn test_build_status_display() {
        assert_eq!(BuildStatus::Success.to_string(), "success");
        assert_eq!(BuildStatus::Skipped.to_string(), "skipped");
        let status = BuildStatus::Failed { errors: vec!["a".into(), "b".into()], fatal: false };
        assert_eq!(status.to_string(), "failed: a; b");
    }

    #[test]
    fn test_skipped_is_not_success() {
        let mut result = BuildResult::new();
        result.add_result(TaskResult::success(Task::Clean, vec![], Duration::ZERO));
        result.add_result(TaskResult::skipped(Task::Copy));
        assert!(!result.is_success());
        assert_eq!(result.skipped_count(), 1);
    }

    #[test]
    fn test_build_result_counts() {
        let mut result = BuildResult::new();
        result.add_result(TaskResult::success(Task::Clean, vec![], Duration::ZERO));
        result.add_result(failed(Task::Copy));
        result.add_result(TaskResult::skipped(Task::IncludeHtml));

        assert_eq!(result.success_count(), 1);
        assert_eq!(result.failed_count(), 1);
        assert_eq!(result.skipped_count(), 1);
        assert!(!result.is_success());
        assert!(!result.failures()[0].is_fatal());
    }

    #[test]
    fn test_build_result_summary() {
        let mut result = BuildResult::new();
        result.add_result(TaskResult::success(
            Task::Style,
            vec![PathBuf::from("styles/styles.css"), PathBuf::from("styles/styles.min.css")],
            Duration::from_millis(100),
        ));
        let summary = result.with_duration(Duration::from_millis(100)).summary();
        assert!(summary.contains("Build succeeded"));
        assert!(summary.contains("2 files"));

        let mut broken = BuildResult::new();
        broken.add_result(failed(Task::Js));
        assert!(broken.summary().contains("  - js: boom"));
    }
}
