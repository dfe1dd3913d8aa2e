//! QPython web-app compatibility branch.
//!
//! Fragments carrying the `#qpy:webapp` marker near the top are handed to the
//! QPython runtime on Android instead of the embedded engine.

use std::{borrow::Cow, io::Write, path::PathBuf, process::Command};

use crate::error::{Error, Result};

const MARKER: &str = "#qpy:webapp";
const HEADER_LEN: usize = 128;

pub fn is_webapp(code: &str) -> bool {
    let mut end = code.len().min(HEADER_LEN);
    while !code.is_char_boundary(end) {
        end -= 1;
    }
    code[..end].contains(MARKER)
}

/// Source for the embedded engine: a bare `#qpy:webapp` header line is not
/// valid Rhai, so it is turned into a `//` comment. Line numbers are kept.
pub fn local_source(code: &str) -> Cow<'_, str> {
    let bare = |line: &str| {
        let line = line.trim_start();
        line.starts_with('#') && line.contains(MARKER)
    };
    let mut seen = 0;
    let mut header = 0;
    for line in code.split_inclusive('\n') {
        if seen >= HEADER_LEN {
            break;
        }
        seen += line.len();
        header += 1;
    }
    if !code.lines().take(header).any(bare) {
        return Cow::Borrowed(code);
    }
    let mut out = String::with_capacity(code.len() + 2);
    for (i, line) in code.split_inclusive('\n').enumerate() {
        if i < header && bare(line) {
            out.push_str("//");
        }
        out.push_str(line);
    }
    Cow::Owned(out)
}

#[derive(Debug, Clone, Default)]
pub struct QpyTarget {
    tmp_dir: Option<PathBuf>,
    launcher: Option<String>,
}

impl QpyTarget {
    pub fn new(tmp_dir: Option<PathBuf>, launcher: Option<String>) -> Self {
        Self { tmp_dir, launcher }
    }

    /// Write `code` to a fresh script in the QPython temp dir and launch it.
    pub fn exec(&self, code: &str) -> Result<PathBuf> {
        let dir = self
            .tmp_dir
            .as_ref()
            .filter(|d| d.is_dir())
            .ok_or_else(|| Error::TargetUnavailable("QPY_TMP is not a directory".into()))?;
        let launcher = self
            .launcher
            .as_deref()
            .ok_or_else(|| Error::TargetUnavailable("QPY_LAUNCHER is not set".into()))?;

        let mut file = tempfile::Builder::new()
            .prefix("qpy")
            .suffix(".py")
            .rand_bytes(10)
            .tempfile_in(dir)?;
        file.write_all(code.as_bytes())?;
        let (_, script) = file.keep().map_err(|e| Error::Io(e.error))?;

        let mut parts = launcher.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::TargetUnavailable("QPY_LAUNCHER is empty".into()))?;
        let status = Command::new(program).args(parts).arg(&script).status()?;
        if !status.success() {
            return Err(Error::TargetFailed(format!("{program} exited with {status}")));
        }
        tracing::info!(script = %script.display(), "fragment handed to QPython");
        Ok(script)
    }
}
