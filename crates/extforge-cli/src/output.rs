use chrono::Local;
use console::style;
use extforge_core::{LogSink, PipelineEvent};
use tracing::debug;

/// Prints pipeline and supervisor progress to stderr as `[HH:MM:SS] line`.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

pub fn format_line(time: &str, event: &PipelineEvent) -> Option<String> {
    let stamp = style(format!("[{time}]")).dim();
    match event {
        PipelineEvent::Log { line } => Some(format!("{stamp} {line}")),
        PipelineEvent::Skipped { reason } => {
            Some(format!("{stamp} {}", style(format!("skipped: {reason}")).yellow()))
        }
        PipelineEvent::StepFailed { step, message } => Some(format!(
            "{stamp} {}",
            style(format!("{step} failed: {message}")).red()
        )),
        PipelineEvent::StepStarted { .. } | PipelineEvent::StepFinished { .. } => None,
    }
}

impl LogSink for ConsoleSink {
    fn on_event(&mut self, event: &PipelineEvent) {
        let time = Local::now().format("%H:%M:%S").to_string();
        match format_line(&time, event) {
            Some(line) => eprintln!("{line}"),
            None => debug!("{event:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extforge_core::Step;

    #[test]
    fn log_lines_carry_timestamp() {
        let line = format_line("12:34:56", &PipelineEvent::log("copy: popup.css")).unwrap();
        let plain = console::strip_ansi_codes(&line);
        assert_eq!(plain, "[12:34:56] copy: popup.css");
    }

    #[test]
    fn step_boundaries_are_not_printed() {
        assert!(format_line("00:00:00", &PipelineEvent::StepStarted { step: Step::Copy }).is_none());
        assert!(
            format_line("00:00:00", &PipelineEvent::StepFinished { step: Step::Copy }).is_none()
        );
    }

    #[test]
    fn failures_name_the_step() {
        let line = format_line(
            "00:00:00",
            &PipelineEvent::StepFailed {
                step: Step::Manifest,
                message: "manifest error: x".to_owned(),
            },
        )
        .unwrap();
        assert!(console::strip_ansi_codes(&line).contains("manifest failed: manifest error: x"));
    }
}
