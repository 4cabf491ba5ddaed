//! Semantic tones for report output, rendered with owo-colors.

use owo_colors::{OwoColorize, Style};

/// Meaning of a piece of output, independent of how it is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Pass,
    Fail,
    Warn,
    Muted,
    Strong,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Tone::Pass => Style::new().green().bold(),
            Tone::Fail => Style::new().red().bold(),
            Tone::Warn => Style::new().yellow(),
            Tone::Muted => Style::new().dimmed(),
            Tone::Strong => Style::new().bold(),
        }
    }
}

/// Paints any displayable value in a tone, or leaves it plain when colors
/// are disabled.
pub trait Paint {
    fn paint(&self, tone: Tone) -> String;

    fn pass(&self) -> String {
        self.paint(Tone::Pass)
    }

    fn fail(&self) -> String {
        self.paint(Tone::Fail)
    }

    fn warn(&self) -> String {
        self.paint(Tone::Warn)
    }

    fn muted(&self) -> String {
        self.paint(Tone::Muted)
    }

    fn strong(&self) -> String {
        self.paint(Tone::Strong)
    }
}

impl<T: std::fmt::Display> Paint for T {
    fn paint(&self, tone: Tone) -> String {
        if super::no_color() {
            self.to_string()
        } else {
            self.style(tone.style()).to_string()
        }
    }
}
