use colored::Colorize;
use std::fmt;
use std::sync::{OnceLock, RwLock};

use crate::wizard::{Notice, NoticeLevel, Notifier, StepProgress, SummaryLine};

/// Message categories used by the terminal output helpers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Success,
    Warning,
    Error,
    Section,
    Separator,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OutputPreferences {
    /// No ANSI colors (pipes, screen readers).
    pub plain: bool,
    pub quiet: bool,
}

static PREFERENCES: OnceLock<RwLock<OutputPreferences>> = OnceLock::new();

pub fn set_preferences(prefs: OutputPreferences) {
    let lock = PREFERENCES.get_or_init(|| RwLock::new(OutputPreferences::default()));
    if let Ok(mut guard) = lock.write() {
        *guard = prefs;
    }
}

fn preferences() -> OutputPreferences {
    PREFERENCES
        .get_or_init(|| RwLock::new(OutputPreferences::default()))
        .read()
        .map(|guard| *guard)
        .unwrap_or_default()
}

fn should_skip(kind: MessageKind, prefs: &OutputPreferences) -> bool {
    prefs.quiet && matches!(kind, MessageKind::Separator | MessageKind::Info)
}

fn build_label(kind: MessageKind) -> (&'static str, &'static str) {
    match kind {
        MessageKind::Info => ("INFO", "[i]"),
        MessageKind::Success => ("SUCCESS", "[✓]"),
        MessageKind::Warning => ("WARNING", "[!]"),
        MessageKind::Error => ("ERROR", "[x]"),
        MessageKind::Section | MessageKind::Separator => ("INFO", ""),
    }
}

fn apply_style(kind: MessageKind, message: impl fmt::Display, prefs: &OutputPreferences) -> String {
    let text = message.to_string();

    let formatted = match kind {
        MessageKind::Section => format!("=== {} ===", text.trim()),
        MessageKind::Separator => String::from("----------------------------------------"),
        _ => {
            let (label, icon) = build_label(kind);
            format!("{label}: {icon} {text}")
        }
    };

    if prefs.plain {
        return formatted;
    }

    match kind {
        MessageKind::Success => formatted.bright_green().to_string(),
        MessageKind::Warning => formatted.bright_yellow().to_string(),
        MessageKind::Error => formatted.bright_red().to_string(),
        MessageKind::Section => formatted.bold().to_string(),
        MessageKind::Separator | MessageKind::Info => formatted,
    }
}

pub fn print(kind: MessageKind, message: impl fmt::Display) {
    let prefs = preferences();
    if should_skip(kind, &prefs) {
        return;
    }
    let formatted = apply_style(kind, message, &prefs);
    match kind {
        MessageKind::Section | MessageKind::Separator => println!("\n{}", formatted),
        MessageKind::Error | MessageKind::Warning => eprintln!("{}", formatted),
        _ => println!("{}", formatted),
    }
}

pub fn info(message: impl fmt::Display) {
    print(MessageKind::Info, message);
}

pub fn success(message: impl fmt::Display) {
    print(MessageKind::Success, message);
}

pub fn warning(message: impl fmt::Display) {
    print(MessageKind::Warning, message);
}

pub fn error(message: impl fmt::Display) {
    print(MessageKind::Error, message);
}

pub fn section(title: impl fmt::Display) {
    print(MessageKind::Section, title);
}

pub fn separator() {
    print(MessageKind::Separator, "");
}

/// One-line step tracker, e.g. `[✓ Details] [> Rule] [  Users] [  Review]`.
pub fn progress_line(progress: &[StepProgress]) -> String {
    progress
        .iter()
        .map(|step| {
            let marker = if step.active {
                ">"
            } else if step.complete {
                "✓"
            } else {
                " "
            };
            format!("[{} {}]", marker, step.title)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn summary_lines(lines: &[SummaryLine]) -> Vec<String> {
    let width = lines
        .iter()
        .map(|line| line.label.chars().count())
        .max()
        .unwrap_or(0);
    lines
        .iter()
        .map(|line| format!("{:<width$}  {}", line.label, line.value, width = width))
        .collect()
}

/// Prints wizard notifications with the colored helpers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        let kind = match notice.level {
            NoticeLevel::Info => MessageKind::Info,
            NoticeLevel::Success => MessageKind::Success,
            NoticeLevel::Warning => MessageKind::Warning,
            NoticeLevel::Error => MessageKind::Error,
        };
        print(kind, notice.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_style_keeps_labels() {
        let prefs = OutputPreferences {
            plain: true,
            quiet: false,
        };
        assert_eq!(
            apply_style(MessageKind::Warning, "Select at least 2 users", &prefs),
            "WARNING: [!] Select at least 2 users"
        );
        assert_eq!(apply_style(MessageKind::Section, " Rule ", &prefs), "=== Rule ===");
    }

    #[test]
    fn progress_marks_active_and_complete_steps() {
        let progress = vec![
            StepProgress {
                id: 1,
                title: "Details",
                complete: true,
                active: false,
            },
            StepProgress {
                id: 2,
                title: "Rule",
                complete: false,
                active: true,
            },
        ];
        assert_eq!(progress_line(&progress), "[✓ Details] [> Rule]");
    }

    #[test]
    fn summary_aligns_labels() {
        let lines = summary_lines(&[
            SummaryLine::new("Name", "Finance"),
            SummaryLine::new("Approvers", "Alice, Bruno"),
        ]);
        assert_eq!(lines[0], "Name       Finance");
        assert_eq!(lines[1], "Approvers  Alice, Bruno");
    }
}
