use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use livepush_core::{PackageMetadata, StatusReport};
use livepush_ledger::LedgerState;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("[{}] {message}", status.to_ascii_uppercase()),
    }
}

pub(crate) fn print_status(style: OutputStyle, status: &str, message: &str) {
    let line = render_status_line(style, status, message);
    match style {
        OutputStyle::Plain => println!("{line}"),
        OutputStyle::Rich => println!("{}", colorize(status_style(status), &line)),
    }
}

fn status_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "error" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightBlue,
    };
    Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn describe_package(package: Option<&PackageMetadata>) -> String {
    match package {
        Some(package) => format!(
            "{} ({}){}",
            package.label,
            package.package_hash,
            if package.is_pending { " pending" } else { "" }
        ),
        None => "-".to_string(),
    }
}

pub(crate) fn format_status_lines(state: &LedgerState) -> Vec<String> {
    let pending = state
        .pending_install
        .map(|pending| {
            format!(
                "{} (min background {}s)",
                pending.install_mode.as_str(),
                pending.minimum_background_duration
            )
        })
        .unwrap_or_else(|| "-".to_string());
    let failed = if state.failed_updates.is_empty() {
        "-".to_string()
    } else {
        state
            .failed_updates
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };

    vec![
        format!("current: {}", describe_package(state.current_package.as_ref())),
        format!("previous: {}", describe_package(state.previous_package.as_ref())),
        format!("pending install: {pending}"),
        format!("needs confirmation: {}", state.needs_confirmation),
        format!("binary first run reported: {}", state.binary_first_run_reported),
        format!("failed updates: {failed}"),
        format!("queued failed report: {}", state.failed_report.is_some()),
        format!("queued rollback report: {}", state.rollback_report.is_some()),
    ]
}

pub(crate) fn format_report(report: &StatusReport) -> String {
    serde_json::to_string(report).unwrap_or_else(|err| format!("<unprintable report: {err}>"))
}
