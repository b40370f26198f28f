//! Terminal styling helpers

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::OwoColorize;
use std::fmt::Display;
use std::time::Duration;
use supports_hyperlinks::Stream;
use terminal_link::Link;

/// Check mark for finished steps
pub const CHECK: &str = "✓";

/// Cross for failed steps
pub const CROSS: &str = "✗";

/// Semantic colors for CLI output
pub trait Stylize: Display {
    /// Headline text
    fn emphasis(&self) -> String {
        self.to_string().bold().to_string()
    }

    /// Names and values the user should spot
    fn accent(&self) -> String {
        self.to_string().cyan().to_string()
    }

    /// Secondary text
    fn muted(&self) -> String {
        self.to_string().dimmed().to_string()
    }

    /// Good news
    fn success(&self) -> String {
        self.to_string().green().to_string()
    }

    /// Needs attention
    fn warn(&self) -> String {
        self.to_string().yellow().to_string()
    }

    /// Failure
    fn error(&self) -> String {
        self.to_string().red().to_string()
    }
}

impl<T: Display + ?Sized> Stylize for T {}

/// Green check mark
pub fn check() -> String {
    CHECK.success()
}

/// Red cross
pub fn cross() -> String {
    CROSS.error()
}

/// Spinner on stderr, so stdout stays clean for tables
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Clickable URL when the terminal supports hyperlinks
pub fn link(url: &str) -> String {
    if url.is_empty() || !supports_hyperlinks::on(Stream::Stdout) {
        return url.to_string();
    }
    Link::new(url, url).to_string()
}
