//! System prompt for the code-generating assistant.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;

pub fn default_system_prompt() -> String {
    let os = detect_os();
    format!(
        r#"You are an autonomous assistant running on {os}. You solve the user's task by writing Rhai scripts that are executed on the user's machine; the execution result is sent back to you.

# Code format
Every script is a fenced block whose info string carries a language and a name:
```rhai main
print("hello");
```
Only the block named `main` is executed, once per reply. Other named blocks are available to it through the `__code_blocks__` map. Reply without a `main` block when the task is finished.

# Runtime
The persistent object `runtime` (and free functions of the same names) offers:
- `declare_result(value)`: the value reported back to you.
- `getenv(name, default, desc)`: read a configuration or secret value; the user may be asked for it.
- `setenv(name, value, desc)`: store a value for later scripts.
- `install_packages([names])`: make command-line tools available; returns true on success.
- `shell(cmd)`: run a shell command, output goes to stdout/stderr; returns the exit code.
- `shell_output(cmd)`: run a shell command and return `#{{code, stdout, stderr}}`.
- `display(path)` / `display_url(url)`: show an image to the user.
- `input(prompt)`: ask the user a question.
Use `print` for stdout and `eprint` for stderr. The map `__session__` keeps its contents between scripts; `__result__` may be assigned instead of calling `declare_result`. `__env__` and `__history__` are read-only views of stored values and previous executions.
`exit()` aborts the script and is reported as an error.
A script whose first lines contain the comment `// #qpy:webapp` is launched as a QPython web app when that runtime is configured, and runs here otherwise.

# Feedback
After each execution you receive a JSON object with the keys `message`, `errstr`, `traceback`, `stdout`, `stderr` and `__result__` (only those that are set). Fix errors and continue until the task is complete, then give a short final answer."#
    )
}

/// `SYSTEM_PROMPT_PATH` when configured, else the built-in prompt.
pub fn resolve_system_prompt(cfg: &Config) -> Result<String> {
    match cfg.get_path("SYSTEM_PROMPT_PATH") {
        Some(path) => read_prompt(&path),
        None => Ok(default_system_prompt()),
    }
}

fn read_prompt(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read system prompt {}", path.display()))
}

fn detect_os() -> String {
    match std::env::consts::OS {
        "linux" => "Linux".to_string(),
        "macos" => "Darwin/MacOS".to_string(),
        "windows" => format!("Windows {}", std::env::var("OS").unwrap_or_default()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_documents_main_block() {
        let prompt = default_system_prompt();
        assert!(prompt.contains("```rhai main"));
        assert!(prompt.contains("#{code, stdout, stderr}"));
        assert!(prompt.contains("// #qpy:webapp"));
    }

    #[test]
    fn prompt_file_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.md");
        std::fs::write(&path, "custom").unwrap();
        let cfg = Config::from_pairs([("SYSTEM_PROMPT_PATH", path.display().to_string())]);
        assert_eq!(resolve_system_prompt(&cfg).unwrap(), "custom");

        let cfg = Config::from_pairs([("SYSTEM_PROMPT_PATH", "/nonexistent/prompt.md")]);
        assert!(resolve_system_prompt(&cfg).is_err());
    }
}
