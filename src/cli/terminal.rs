//! Styling for command output
//!
//! Output is painted by [`Role`] rather than by colour, so every command shows
//! identifiers, kinds and association marks the same way. Whether stdout takes
//! colour is decided once per process.

use std::{fmt, sync::OnceLock};

use owo_colors::{OwoColorize, Style};

/// What a piece of output represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A completed change.
    Success,
    /// Something the user should notice, such as a removed link.
    Warning,
    /// An item identifier.
    Id,
    /// An entity kind.
    Kind,
    /// Descriptions, labels and other secondary text.
    Muted,
}

impl Role {
    fn style(self) -> Style {
        let style = Style::new();
        match self {
            Self::Success => style.green(),
            Self::Warning => style.yellow(),
            Self::Id => style.bright_blue().bold(),
            Self::Kind => style.magenta(),
            Self::Muted => style.dimmed(),
        }
    }
}

fn color_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| supports_color::on(supports_color::Stream::Stdout).is_some())
}

fn render<T: fmt::Display + ?Sized>(text: &T, role: Role, color: bool) -> String {
    if color {
        text.style(role.style()).to_string()
    } else {
        text.to_string()
    }
}

/// Paints anything displayable according to its [`Role`].
pub trait Paint: fmt::Display {
    /// Renders `self` in the style of `role`.
    fn paint(&self, role: Role) -> String {
        render(self, role, color_enabled())
    }
}

impl<T: fmt::Display + ?Sized> Paint for T {}

/// The mark shown beside an association candidate.
pub fn checkbox(checked: bool) -> String {
    if checked {
        "[x]".paint(Role::Success)
    } else {
        "[ ]".paint(Role::Muted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_without_color() {
        assert_eq!(render("R1", Role::Id, false), "R1");
        assert_eq!(render(&42, Role::Muted, false), "42");
    }

    #[test]
    fn colored_output_wraps_text_in_escapes() {
        let painted = render("R1", Role::Id, true);
        assert!(painted.starts_with('\u{1b}'));
        assert!(painted.contains("R1"));
        assert_ne!(painted, render("R1", Role::Success, true));
    }

    #[test]
    fn checkbox_marks_membership() {
        assert!(checkbox(true).contains("[x]"));
        assert!(checkbox(false).contains("[ ]"));
    }
}
