use std::cell::RefCell;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use pressup_core::UpgradeError;
use pressup_upgrader::UpgradeEvents;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn current_output_style() -> OutputStyle {
    let no_color = std::env::var_os("NO_COLOR").is_some();
    output_style_for(std::io::stdout().is_terminal(), no_color)
}

pub fn output_style_for(is_terminal: bool, no_color: bool) -> OutputStyle {
    if is_terminal && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

fn badge_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "err" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightBlue,
    };
    Style::new().fg_color(Some(color.into())).effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

/// Plain output stays machine-friendly: no badges, no escapes.
pub fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

pub fn print_status(style: OutputStyle, status: &str, message: &str) {
    if style == OutputStyle::Plain {
        println!("{message}");
        return;
    }
    println!(
        "{} {message}",
        colorize(badge_style(status), status_badge(status))
    );
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

/// One line per entry of an aggregated error, code first.
pub fn format_error_lines(error: &UpgradeError, style: OutputStyle) -> Vec<String> {
    error
        .entries()
        .into_iter()
        .map(|entry| {
            let message = match &entry.data {
                Some(pressup_core::ErrorData::Text(detail)) if !detail.is_empty() => {
                    format!("{} ({}): {detail}", entry.message, entry.code)
                }
                _ => format!("{} ({})", entry.message, entry.code),
            };
            render_status_line(style, "err", &message)
        })
        .collect()
}

/// Renders upgrader progress on the terminal. Rich output keeps a spinner
/// showing the current step; plain output prints each step.
pub struct CliEvents {
    style: OutputStyle,
    spinner: RefCell<Option<ProgressBar>>,
    started_at: Instant,
}

impl CliEvents {
    pub fn new(style: OutputStyle) -> Self {
        Self {
            style,
            spinner: RefCell::new(None),
            started_at: Instant::now(),
        }
    }

    fn with_spinner(&self, message: &str) {
        let mut spinner = self.spinner.borrow_mut();
        let bar = spinner.get_or_insert_with(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg}") {
                bar.set_style(style.tick_chars("-=~* "));
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        bar.set_message(message.to_string());
    }

    fn println(&self, line: String) {
        match self.spinner.borrow().as_ref() {
            Some(bar) => bar.println(line),
            None => println!("{line}"),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = self.spinner.borrow_mut().take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for CliEvents {
    fn drop(&mut self) {
        self.finish();
    }
}

impl UpgradeEvents for CliEvents {
    fn feedback(&self, message: &str) {
        tracing::debug!("{message}");
        match self.style {
            OutputStyle::Plain => println!("{message}"),
            OutputStyle::Rich => self.with_spinner(message),
        }
    }

    fn error(&self, error: &UpgradeError) {
        tracing::warn!(code = error.code(), "{}", error.display_messages());
        for line in format_error_lines(error, self.style) {
            self.println(line);
        }
    }

    fn core_updated(&self, version: &str) {
        let message = format!(
            "core updated to {version} in {}",
            format_elapsed(self.started_at.elapsed())
        );
        self.println(render_status_line(self.style, "ok", &message));
    }

    fn process_complete(&self, action: &str, kind: &str) {
        tracing::debug!(action, kind, "upgrade process complete");
        self.finish();
    }
}
