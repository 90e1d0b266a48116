//! Coloured terminal output

use owo_colors::{OwoColorize, colors::css};

/// Whether stdout should be coloured
pub fn supports_color() -> bool {
    supports_color::on(supports_color::Stream::Stdout).is_some()
}

fn paint(text: &str, style: impl Fn(&str) -> String) -> String {
    if supports_color() {
        style(text)
    } else {
        text.to_owned()
    }
}

/// Extension trait for colouring command output
pub trait Colorize {
    /// Something rendered or passed (green)
    fn success(&self) -> String;
    /// A redirect or a degraded result (amber)
    fn warning(&self) -> String;
    /// A failure (red)
    fn failure(&self) -> String;
    /// A path or a name (blue)
    fn info(&self) -> String;
    /// Secondary detail
    fn dim(&self) -> String;
}

impl<T: AsRef<str> + ?Sized> Colorize for T {
    fn success(&self) -> String {
        paint(self.as_ref(), |s| s.fg::<css::Green>().to_string())
    }

    fn warning(&self) -> String {
        paint(self.as_ref(), |s| s.fg::<css::Orange>().to_string())
    }

    fn failure(&self) -> String {
        paint(self.as_ref(), |s| s.fg::<css::Red>().to_string())
    }

    fn info(&self) -> String {
        paint(self.as_ref(), |s| s.fg::<css::LightBlue>().to_string())
    }

    fn dim(&self) -> String {
        paint(self.as_ref(), |s| s.dimmed().to_string())
    }
}
