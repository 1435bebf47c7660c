//! The seam between the disk layer and the operating system.
//!
//! Every external effect of the library (running `diskpart`, querying `wmic`,
//! reading `/proc/partitions`, enumerating drive letters, writing to a raw
//! device) goes through a [`Host`]. The real implementation lives in
//! [`crate::platform`]; tests drive the same code through a scripted host.

use crate::error::Result;
use crate::write::Progress;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub trait Host {
    /// Runs `script` (one command per line) through the disk partitioning
    /// utility and returns its captured output.
    fn diskpart(&self, script: &str) -> Result<String>;

    /// Runs `wmic diskdrive get <fields>` and returns its captured output.
    fn wmic_diskdrive(&self, fields: &[&str]) -> Result<String>;

    /// The text of `/proc/partitions` as seen by the POSIX compatibility layer.
    fn proc_partitions(&self) -> Result<String>;

    /// Letters currently bound to a logical drive.
    fn logical_drives(&self) -> Result<Vec<char>>;

    /// Letters bound to remembered network drive mappings, connected or not.
    fn remembered_network_drives(&self) -> Result<Vec<char>>;

    /// The path the raw image copy should open for `disk`, whose device file
    /// was resolved as `device_file`.
    fn raw_device_path(&self, disk: u32, device_file: &Path) -> PathBuf;

    /// Copies `image` onto the raw `device`, optionally verifying it, and
    /// returns the number of image bytes written.
    fn write_image(
        &self,
        image: &Path,
        device: &Path,
        verify: bool,
        running: Arc<AtomicBool>,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<u64>;
}
