//! Terminal and JSON reporting for run results.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use suitectl_core::{ProgressEvent, RunResult};
use suitectl_proto::{ArtifactOutcome, JobStatus, SuiteResult};

/// Prints run progress and the final summary.
#[derive(Debug, Default)]
pub struct TerminalReporter;

impl TerminalReporter {
    pub fn new() -> Self {
        Self
    }

    /// Handles a progress event, printing appropriate output.
    pub fn handle_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted {
                remote_suites,
                local_suites,
                dry_run,
            } => {
                let total = remote_suites + local_suites;
                let mode = if dry_run { " (dry run)" } else { "" };
                println!(
                    "\n{}",
                    format!(
                        "Running {} suite{}{}...",
                        total,
                        if total == 1 { "" } else { "s" },
                        mode
                    )
                    .bold()
                );
            }
            ProgressEvent::ConcurrencyResolved { capacity } => {
                println!(
                    "{}",
                    format!("Concurrency: {capacity} at a time").dimmed()
                );
            }
            ProgressEvent::LocalCompleted { outcome } => {
                let status = if outcome.passed() {
                    "PASSED".green()
                } else {
                    format!("FAILED (exit {})", outcome.exit_code).red()
                };
                println!("  {} local: {}", status, outcome.suites.join(", "));
            }
            ProgressEvent::SuiteCompleted { result } => {
                println!("  {}", format_suite_line(&result));
            }
            ProgressEvent::RunCompleted { .. } => {}
        }
    }

    /// Prints a full summary of the run.
    pub fn print_summary(&self, run: &RunResult) {
        println!("\n{}", "━".repeat(40).dimmed());

        let failures = run.failures();
        if !failures.is_empty() {
            println!("{}", "Failed suites:".red().bold());
            for result in failures {
                println!("  {}", format_suite_line(result));
                if let Some(error) = &result.error {
                    println!("     {}", error.dimmed());
                }
            }
            println!();
        }

        println!("{}", format_verdict(run));
        let counts = format_counts(run);
        if !counts.is_empty() {
            println!("   {counts}");
        }
        println!(
            "\n   {}",
            format!("Completed in {:.1}s", run.duration.as_secs_f64()).dimmed()
        );
    }
}

fn status_label(status: JobStatus) -> colored::ColoredString {
    let label = status.as_str().to_uppercase();
    match status {
        JobStatus::Passed => label.green(),
        JobStatus::Failed | JobStatus::Errored => label.red(),
        JobStatus::TimedOut | JobStatus::Stopped => label.yellow(),
        JobStatus::Queued | JobStatus::Running => label.normal(),
    }
}

/// One line per suite: status, name, duration, job, artifacts.
pub fn format_suite_line(result: &SuiteResult) -> String {
    let mut line = format!(
        "{} {} {}",
        status_label(result.status),
        result.suite_name,
        format!("({:.1}s)", result.duration.as_secs_f64()).dimmed()
    );
    if result.dry_run {
        line.push_str(&format!(" {}", "[dry run]".dimmed()));
    }
    if let Some(job) = &result.job_id {
        line.push_str(&format!(" {}", format!("job {job}").dimmed()));
    }
    match &result.artifacts {
        ArtifactOutcome::Downloaded { files } => {
            line.push_str(&format!(" {} artifact(s)", files.len()));
        }
        ArtifactOutcome::Partial { files, failed } => {
            line.push_str(&format!(
                " {} artifact(s), {} failed",
                files.len(),
                failed.len()
            ));
        }
        ArtifactOutcome::Failed { reason } => {
            line.push_str(&format!(" {}", format!("artifacts failed: {reason}").yellow()));
        }
        ArtifactOutcome::Skipped => {}
    }
    line
}

fn format_verdict(run: &RunResult) -> String {
    let total = run.suite_count();
    if run.success() {
        format!("PASSED: {total} of {total} suites").green().bold().to_string()
    } else {
        let local_failing = run
            .local
            .as_ref()
            .filter(|l| !l.passed())
            .map_or(0, |l| l.suites.len());
        let failing = run.failures().len() + local_failing;
        format!("FAILED: {failing} of {total} suites did not pass")
            .red()
            .bold()
            .to_string()
    }
}

fn format_counts(run: &RunResult) -> String {
    let mut parts = vec![];
    let passed = run.passed_count();
    if passed > 0 {
        parts.push(format!("{passed} passed").green().to_string());
    }
    for (count, label) in [
        (run.failed_count(), "failed"),
        (run.errored_count(), "errored"),
        (run.timed_out_count(), "timed out"),
    ] {
        if count > 0 {
            parts.push(format!("{count} {label}").red().to_string());
        }
    }
    let stopped = run.stopped_count();
    if stopped > 0 {
        parts.push(format!("{stopped} stopped").yellow().to_string());
    }
    parts.join(", ")
}

/// Writes the run result as pretty-printed JSON.
pub fn write_json_report(path: &Path, run: &RunResult) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(run).context("Failed to serialize run result")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;
    use suitectl_core::LocalOutcome;
    use suitectl_proto::JobId;
    use tempfile::TempDir;

    fn build(name: &str, status: JobStatus) -> SuiteResult {
        SuiteResult::new(name, status, Utc::now())
    }

    fn mixed_run() -> RunResult {
        RunResult::new(
            vec![
                build("chrome", JobStatus::Passed)
                    .with_job(Some(JobId::new("job-1")))
                    .with_artifacts(ArtifactOutcome::Downloaded {
                        files: vec![PathBuf::from("artifacts/chrome/console.log")],
                    }),
                build("firefox", JobStatus::Errored)
                    .with_error("failed to start job: rejected"),
                build("safari", JobStatus::Stopped),
            ],
            None,
            false,
        )
    }

    #[test]
    fn test_suite_line_mentions_job_and_artifacts() {
        colored::control::set_override(false);
        let run = mixed_run();
        let line = format_suite_line(&run.results[0]);
        assert!(line.starts_with("PASSED chrome"), "line: {line}");
        assert!(line.contains("job job-1"));
        assert!(line.contains("1 artifact(s)"));
    }

    #[test]
    fn test_verdict_and_counts() {
        colored::control::set_override(false);
        let run = mixed_run();
        assert_eq!(format_verdict(&run), "FAILED: 2 of 3 suites did not pass");
        assert_eq!(format_counts(&run), "1 passed, 1 errored, 1 stopped");
    }

    #[test]
    fn test_verdict_counts_every_failed_local_suite() {
        colored::control::set_override(false);
        let run = RunResult::new(
            vec![build("chrome", JobStatus::Passed)],
            Some(LocalOutcome {
                suites: vec!["docker-a".into(), "docker-b".into()],
                exit_code: 1,
            }),
            false,
        );
        assert_eq!(format_verdict(&run), "FAILED: 2 of 3 suites did not pass");
    }

    #[test]
    fn test_json_report_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("run.json");

        write_json_report(&path, &mixed_run()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["results"].as_array().unwrap().len(), 3);
        assert_eq!(value["results"][1]["status"], "errored");
        assert_eq!(value["dry_run"], false);
    }
}
