//! Host tool provisioning for `install_packages`.

use std::process::Command;

use crate::error::{Error, Result};
use crate::utils::command::find_executable;

#[derive(Debug, Clone, Default)]
pub struct Installer {
    /// Command prefix; the missing names are appended as arguments.
    command: Option<String>,
}

impl Installer {
    pub fn new(command: Option<String>) -> Self {
        Self { command: command.or_else(default_command) }
    }

    /// Split `names` into (present, missing).
    pub fn partition(&self, names: &[String]) -> (Vec<String>, Vec<String>) {
        names
            .iter()
            .cloned()
            .partition(|name| find_executable(name).is_some())
    }

    pub fn install(&self, names: &[String]) -> Result<bool> {
        let command = self.command.as_deref().ok_or(Error::NoInstaller)?;
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or(Error::NoInstaller)?;
        tracing::info!(command = %command, packages = ?names, "installing packages");
        let status = Command::new(program).args(parts).args(names).status()?;
        if !status.success() {
            tracing::warn!(status = %status, "package install failed");
        }
        Ok(status.success())
    }
}

fn default_command() -> Option<String> {
    match std::env::consts::OS {
        "macos" => Some("brew install".into()),
        "linux" => Some("apt-get install -y".into()),
        "windows" => Some("winget install".into()),
        _ => None,
    }
}
