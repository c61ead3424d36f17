use std::io::IsTerminal;

use crate::progress::ProgressEvent;

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta / dark pink
pub const RESET_COLOR: &str = "\x1b[0m";

/// Formatter color mode for telemetry output.
///
/// Controls whether ANSI color codes are included in formatted output:
/// - [`FormatterMode::Auto`]: Automatically detects TTY capability via `stderr.is_terminal()`
/// - [`FormatterMode::Colored`]: Always include color codes (for forced color output)
/// - [`FormatterMode::Plain`]: Never include color codes (for logs/files)
///
/// # Examples
/// ```
/// use packferry::telemetry::FormatterMode;
///
/// // Auto-detect based on TTY
/// let mode = FormatterMode::auto_detect();
///
/// // Force colored output
/// let mode = FormatterMode::Colored;
///
/// // Force plain output for logging
/// let mode = FormatterMode::Plain;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterMode {
    /// Auto-detect TTY capability (checks `stderr.is_terminal()`)
    #[default]
    Auto,
    /// Always include ANSI color codes
    Colored,
    /// Never include ANSI color codes
    Plain,
}

impl FormatterMode {
    /// Auto-detect formatter mode based on stderr TTY capability.
    #[must_use]
    pub fn auto_detect() -> Self {
        if std::io::stderr().is_terminal() {
            FormatterMode::Colored
        } else {
            FormatterMode::Plain
        }
    }

    /// Returns true if this mode should use colored output.
    ///
    /// For `Auto` mode, performs TTY detection on each call.
    #[must_use]
    pub fn is_colored(&self) -> bool {
        match self {
            FormatterMode::Auto => std::io::stderr().is_terminal(),
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
        }
    }
}

/// Rendered output for a progress event that can be consumed by sinks.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    #[must_use]
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &ProgressEvent) -> EventRender;
}

/// Plain text formatter with optional ANSI color codes.
///
/// Color output is controlled by [`FormatterMode`]:
/// - `Auto`: Uses color when stderr is a TTY
/// - `Colored`: Always uses color
/// - `Plain`: Never uses color
///
/// Colored output renders the scope in [`CONTEXT_COLOR`] and the message in
/// [`LINE_COLOR`]; plain output is the event's `Display` form.
///
/// # Examples
/// ```
/// use packferry::telemetry::{FormatterMode, PlainFormatter};
///
/// // Auto-detect TTY
/// let formatter = PlainFormatter::new();
///
/// // Force plain output (no colors)
/// let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
/// ```
pub struct PlainFormatter {
    mode: FormatterMode,
}

impl PlainFormatter {
    /// Create a new formatter with auto-detected color mode.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: FormatterMode::Auto,
        }
    }

    /// Create a new formatter with explicit color mode.
    #[must_use]
    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &ProgressEvent) -> EventRender {
        let context = event.scope.to_string();
        let line = if self.mode.is_colored() {
            let body = match event.percent {
                Some(percent) => format!("{} ({percent}%)", event.message),
                None => event.message.clone(),
            };
            format!("{CONTEXT_COLOR}[{context}]{RESET_COLOR} {LINE_COLOR}{body}{RESET_COLOR}\n")
        } else {
            format!("{event}\n")
        };
        EventRender {
            context: Some(context),
            lines: vec![line],
        }
    }
}
