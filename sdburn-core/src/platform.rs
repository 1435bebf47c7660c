//! Provides the [`Host`] implementation for the machine we run on.
//!
//! The tool invocations (`diskpart`, `wmic`, the compatibility shell) are the
//! same everywhere and live here. Drive letter enumeration and the raw device
//! naming differ per OS and come from the conditionally compiled submodule,
//! which exposes the same functions on every platform.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use self::unix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use self::windows as os;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::write::{self, Progress};
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tempfile::NamedTempFile;
use tracing::debug;

/// Runs `program` to completion and returns its standard output.
fn run_tool<I, S>(program: &Path, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program).args(args).output()?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    debug!(tool = %program.display(), status = %output.status, "{stdout}");

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::ExternalTool {
            tool: program.display().to_string(),
            status: output.status.to_string(),
            output: format!("{}{}", stdout.trim(), stderr.trim()),
        });
    }
    Ok(stdout)
}

/// Writes a diskpart script into its own temporary file. The file is removed
/// when the returned handle is dropped, whatever the outcome of the run.
fn scratch_script(commands: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("sdburn-")
        .suffix(".txt")
        .tempfile()?;
    writeln!(file, "{commands}")?;
    writeln!(file, "exit")?;
    file.flush()?;
    Ok(file)
}

/// The host backed by the real operating system.
#[derive(Clone, Debug, Default)]
pub struct SystemHost {
    config: Config,
}

impl SystemHost {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Host for SystemHost {
    fn diskpart(&self, script: &str) -> Result<String> {
        debug!(script, "running diskpart");
        let file = scratch_script(script)?;
        run_tool(
            &self.config.diskpart,
            [OsStr::new("/s"), file.path().as_os_str()],
        )
    }

    fn wmic_diskdrive(&self, fields: &[&str]) -> Result<String> {
        let fields = fields.join(",");
        run_tool(&self.config.wmic, ["diskdrive", "get", fields.as_str()])
    }

    fn proc_partitions(&self) -> Result<String> {
        run_tool(&self.config.shell, ["-c", "cat /proc/partitions"])
    }

    fn logical_drives(&self) -> Result<Vec<char>> {
        os::logical_drives()
    }

    fn remembered_network_drives(&self) -> Result<Vec<char>> {
        os::remembered_network_drives()
    }

    fn raw_device_path(&self, disk: u32, device_file: &Path) -> PathBuf {
        os::raw_device_path(disk, device_file)
    }

    fn write_image(
        &self,
        image: &Path,
        device: &Path,
        verify: bool,
        running: Arc<AtomicBool>,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<u64> {
        write::run(
            image,
            device,
            self.config.chunk_size,
            verify,
            running,
            on_progress,
        )
    }
}
