//! Shell command execution utilities.

use std::{
    io,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

/// Build a command that runs `cmd` through the platform shell.
///
/// On Windows: PowerShell if available (determined by PSModulePath), otherwise cmd.exe
/// On Unix-like systems: the shell named by SHELL, or /bin/sh as fallback
pub fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let prefer_ps = !std::env::var("PSModulePath").unwrap_or_default().is_empty();
        if prefer_ps {
            let mut c = Command::new("powershell.exe");
            c.args(["-NoLogo", "-NoProfile", "-Command", cmd]);
            c
        } else {
            let mut c = Command::new("cmd.exe");
            c.args(["/c", cmd]);
            c
        }
    } else {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into());
        let mut c = Command::new(shell);
        c.arg("-c").arg(cmd);
        c
    }
}

/// Run `cmd` through the platform shell, collecting raw output bytes.
pub fn run_captured(cmd: &str) -> io::Result<Output> {
    shell_command(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
}

/// Locate an executable named `name` on PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let direct = Path::new(name);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}
