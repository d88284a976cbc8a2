//! CLI output formatting

use crate::{
    core::ExecutionStatus,
    execution::{ExecutionEvent, OutputStream},
    persistence::ExecutionSummary,
};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format run summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        _ => INFO,
    };

    let detail = match (&summary.failed_step, summary.published) {
        (_, true) => format!("published {}", summary.version),
        (Some(step), false) => format!("failed at {}", step),
        (None, false) => "not published".to_string(),
    };

    format!(
        "{} {} - {} {} - {} ({}/{}) - {}",
        status_icon,
        style(&summary.execution_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        style(&summary.tag).cyan(),
        format_status(summary.status),
        summary.completed_steps,
        summary.total_steps,
        style(detail).dim()
    )
}

/// Format an execution event for display
///
/// Output lines are handled by `format_output_line` and return `None` here.
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            tag,
        } => format!(
            "{} Starting {} for {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(tag).cyan(),
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StepStarted {
            name,
            position,
            total,
            ..
        } => format!(
            "{} [{}/{}] {}",
            SPINNER,
            position,
            total,
            style(name).cyan()
        ),
        ExecutionEvent::StepOutput { .. } => return None,
        ExecutionEvent::StepCompleted { step_id } => {
            format!("{} {}", CHECK, style(step_id).green())
        }
        ExecutionEvent::StepFailed { step_id, error } => {
            format!("{} {}: {}", CROSS, style(step_id).red(), style(error).dim())
        }
        ExecutionEvent::StepSkipped { step_id, reason } => {
            format!("{} {} ({})", SKIP, style(step_id).dim(), reason)
        }
        ExecutionEvent::JobTornDown { .. } => {
            format!("{} Workspace removed", INFO)
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => format!(
            "{} Pipeline ({}) {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    };
    Some(line)
}

/// Format one streamed output line
pub fn format_output_line(step_id: &str, stream: OutputStream, line: &str) -> String {
    match stream {
        OutputStream::Stdout => format!("  {} {}", style(format!("{}|", step_id)).dim(), line),
        OutputStream::Stderr => format!(
            "  {} {}",
            style(format!("{}|", step_id)).dim(),
            style(line).yellow()
        ),
    }
}

/// Format a duration as `1h 2m 3s`
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        use std::time::Duration;
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
    }

    #[test]
    fn test_output_lines_not_formatted_as_events() {
        let event = ExecutionEvent::StepOutput {
            step_id: "test".to_string(),
            stream: OutputStream::Stdout,
            line: "running 3 tests".to_string(),
        };
        assert!(format_execution_event(&event).is_none());
    }
}
