//! Console abstraction used by the runner and the task loop.
//!
//! Console output goes straight to the terminal, never through the execution
//! capture sink, so prompts stay visible while a fragment runs.

use std::io::{self, BufRead, Write};

use crate::printer::{render_panel, Color, MarkdownPrinter, TextPrinter};

pub trait Console: Send + Sync {
    fn print(&self, text: &str);

    /// Transient progress line.
    fn status(&self, text: &str) {
        self.print(text);
    }

    /// Read one line from the user. I/O failures read as an empty answer.
    fn input(&self, prompt: &str) -> String;

    fn panel(&self, title: &str, body: &str) {
        self.print(&format!("{title}\n{body}"));
    }

    fn code_panel(&self, title: &str, code: &str) {
        self.panel(title, code);
    }

    fn markdown(&self, text: &str) {
        self.print(text);
    }

    fn display_image(&self, path: Option<&str>, url: Option<&str>) {
        if let Some(target) = path.or(url) {
            self.print(&format!("🖼  {target}"));
        }
    }

    fn is_quiet(&self) -> bool {
        false
    }

    /// Ask a yes/no question; `auto` approves without asking.
    fn confirm(&self, prompt: &str, auto: bool) -> bool {
        if auto {
            self.print("✅ Auto confirm");
            return true;
        }
        let answer = self.input(prompt);
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// Terminal console: owo-colors for status lines, termimad for markdown.
#[derive(Default)]
pub struct TermConsole {
    quiet: bool,
}

impl TermConsole {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Console for TermConsole {
    fn print(&self, text: &str) {
        println!("{}", text);
    }

    fn status(&self, text: &str) {
        if !self.quiet {
            TextPrinter { color: Some(Color::Dim) }.print(text);
        }
    }

    fn input(&self, prompt: &str) -> String {
        print!("{}", TextPrinter { color: Some(Color::Cyan) }.render(prompt));
        io::stdout().flush().ok();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) => line.trim_end_matches(['\r', '\n']).to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read console input");
                String::new()
            }
        }
    }

    fn panel(&self, title: &str, body: &str) {
        println!("{}", render_panel(title, body, false));
    }

    fn code_panel(&self, title: &str, code: &str) {
        println!("{}", render_panel(title, code, true));
    }

    fn markdown(&self, text: &str) {
        if self.quiet {
            println!("{}", text);
        } else {
            MarkdownPrinter::default().print(text);
        }
    }

    fn is_quiet(&self) -> bool {
        self.quiet
    }
}
