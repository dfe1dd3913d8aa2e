use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "aipy", about = "Let the model write and run code for your task", version)]
pub struct Cli {
    /// Task instruction. Without one (and without piped stdin) an interactive
    /// session starts.
    #[arg(value_name = "INSTRUCTION")]
    pub prompt: Option<String>,

    /// Large language model to use.
    #[arg(long)]
    pub model: Option<String>,

    /// Upper bound on executed rounds per instruction.
    #[arg(long = "max-rounds")]
    pub max_rounds: Option<usize>,

    /// Path of the key=value config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Install requested tools without asking.
    #[arg(long = "auto-install")]
    pub auto_install: bool,

    /// Answer secret requests with their defaults without asking.
    #[arg(long = "auto-getenv")]
    pub auto_getenv: bool,

    /// Plain output: no status lines, no Markdown rendering.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Do not export finished tasks.
    #[arg(long = "no-save")]
    pub no_save: bool,

    /// Debug logging on stderr (overridden by RUST_LOG).
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
