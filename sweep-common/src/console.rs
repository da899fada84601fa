//! Operator-facing console lines.
//!
//! These are the timestamped `[...] ✓ message` lines a person watches during
//! a sweep. They are separate from tracing output, which may be JSON or go to
//! a file.

use colored::Colorize;
use is_terminal::IsTerminal;
use std::sync::Once;

static COLOR_INIT: Once = Once::new();

/// Disable colour when `NO_COLOR` is set or stdout is not a terminal.
fn init_color() {
    COLOR_INIT.call_once(|| {
        if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
            colored::control::set_override(false);
        }
    });
}

pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn log(message: &str) {
    init_color();
    println!("{} {message}", format!("[{}]", timestamp()).blue());
}

pub fn success(message: &str) {
    init_color();
    println!("{} {message}", format!("[{}] ✓", timestamp()).green());
}

pub fn error(message: &str) {
    init_color();
    println!("{} {message}", format!("[{}] ✗", timestamp()).red());
}

pub fn warning(message: &str) {
    init_color();
    println!("{} {message}", format!("[{}] ⚠", timestamp()).yellow().bold());
}

/// A line of streamed subprocess output, prefixed with its source.
pub fn stream_line(source: &str, line: &str) {
    init_color();
    println!("{} {line}", format!("[{source}]").dimmed());
}

/// Horizontal rule used around banners.
pub fn rule() -> String {
    "=".repeat(72)
}

pub fn banner(title: &str) {
    log(&rule());
    log(title);
    log(&rule());
}
