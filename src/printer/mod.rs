//! Printers: colored text, markdown (termimad) and titled panels.

use owo_colors::OwoColorize;
use termimad::{FmtText, MadSkin};
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Green,
    Cyan,
    Red,
    Yellow,
    Dim,
}

pub struct TextPrinter {
    pub color: Option<Color>,
}

impl TextPrinter {
    pub fn render(&self, text: &str) -> String {
        match self.color {
            Some(Color::Green) => format!("{}", text.green()),
            Some(Color::Cyan) => format!("{}", text.cyan()),
            Some(Color::Red) => format!("{}", text.red()),
            Some(Color::Yellow) => format!("{}", text.yellow()),
            Some(Color::Dim) => format!("{}", text.dimmed()),
            None => text.to_string(),
        }
    }

    pub fn print(&self, text: &str) {
        println!("{}", self.render(text));
    }
}

pub struct MarkdownPrinter {
    pub skin: MadSkin,
    pub width: usize,
}

impl Default for MarkdownPrinter {
    fn default() -> Self {
        Self { skin: MadSkin::default(), width: 100 }
    }
}

impl MarkdownPrinter {
    /// Render `text` wrapped to `width` columns.
    pub fn render(&self, text: &str) -> String {
        FmtText::from(&self.skin, text, Some(self.width)).to_string()
    }

    pub fn print(&self, text: &str) {
        println!("{}", self.render(text));
    }
}

/// Box `body` under `title`, padding every line to the widest one.
/// Lines are numbered when `numbered` is set (code listings).
pub fn render_panel(title: &str, body: &str, numbered: bool) -> String {
    let gutter = body.lines().count().to_string().len();
    let lines: Vec<String> = body
        .lines()
        .enumerate()
        .map(|(i, l)| {
            if numbered {
                format!("{:>gutter$} │ {}", i + 1, l, gutter = gutter)
            } else {
                l.to_string()
            }
        })
        .collect();
    let inner = lines
        .iter()
        .map(|l| UnicodeWidthStr::width(l.as_str()))
        .chain(std::iter::once(UnicodeWidthStr::width(title) + 2))
        .max()
        .unwrap_or(0);

    let title_w = UnicodeWidthStr::width(title);
    let mut out = String::new();
    out.push_str(&format!("╭─ {} {}╮\n", title, "─".repeat(inner.saturating_sub(title_w + 1))));
    for l in &lines {
        let pad = inner - UnicodeWidthStr::width(l.as_str());
        out.push_str(&format!("│ {}{} │\n", l, " ".repeat(pad)));
    }
    out.push_str(&format!("╰{}╯", "─".repeat(inner + 2)));
    out
}
