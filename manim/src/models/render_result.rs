use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Outcome of one scene invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderResult {
    pub scene: String,
    pub success: bool,
    /// None when the process never started or was killed by a signal.
    pub exit_code: Option<i32>,
    pub output: String,
}

impl RenderResult {
    pub fn failed(scene: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            success: false,
            exit_code: None,
            output: output.into(),
        }
    }
}

/// Aggregate of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSummary {
    pub id: Uuid,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub output_path: String,
    pub elapsed: Duration,
    /// In completion order.
    pub results: Vec<RenderResult>,
    /// Set when the worker pool broke and the run was redone one scene at a time.
    pub fell_back: bool,
}

impl RenderSummary {
    pub fn new(id: Uuid, output_path: impl Into<String>) -> Self {
        Self {
            id,
            total: 0,
            successful: 0,
            failed: 0,
            output_path: output_path.into(),
            elapsed: Duration::ZERO,
            results: Vec::new(),
            fell_back: false,
        }
    }

    pub fn record(&mut self, result: RenderResult) {
        if result.success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    /// Process exit status for the whole run.
    pub fn status_code(&self) -> i32 {
        if self.failed == 0 && self.total > 0 {
            0
        } else {
            1
        }
    }

    /// Closing banner printed after a run.
    pub fn report(&self) -> String {
        let secs = self.elapsed.as_secs();
        let mut out = String::new();
        out.push_str(&"=".repeat(60));
        out.push('\n');
        out.push_str(&format!(
            "Render finished! {}/{} scenes succeeded\n",
            self.successful, self.total
        ));
        if self.failed > 0 {
            out.push_str(&format!("{} scene(s) failed\n", self.failed));
        }
        if self.fell_back {
            out.push_str("Worker pool failed, scenes were rendered one at a time\n");
        }
        out.push_str(&format!("Total time: {}m{}s\n", secs / 60, secs % 60));
        out.push_str(&format!("Output: {}\n", self.output_path));
        out.push_str(&"=".repeat(60));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(scene: &str, success: bool) -> RenderResult {
        RenderResult {
            scene: scene.to_owned(),
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            output: String::new(),
        }
    }

    #[test]
    fn record_counts() {
        let mut summary = RenderSummary::new(Uuid::new_v4(), "media/videos/scene/1080p60/");
        summary.total = 3;
        summary.record(result("A", true));
        summary.record(result("B", false));
        summary.record(result("C", true));
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.status_code(), 1);
    }

    #[test]
    fn empty_run_is_a_failure() {
        let summary = RenderSummary::new(Uuid::new_v4(), "");
        assert_eq!(summary.status_code(), 1);
    }

    #[test]
    fn report_mentions_counts_and_output() {
        let mut summary = RenderSummary::new(Uuid::new_v4(), "media/videos/waya/480p15/");
        summary.total = 1;
        summary.record(result("A", true));
        summary.elapsed = Duration::from_secs(75);
        let report = summary.report();
        assert!(report.contains("1/1 scenes succeeded"));
        assert!(report.contains("1m15s"));
        assert!(report.contains("media/videos/waya/480p15/"));
        assert!(!report.contains("failed"));
    }
}
