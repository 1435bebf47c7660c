use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

// Drive letters only exist on Windows. The disk layer still builds here so it
// can be exercised against a scripted host.

pub fn logical_drives() -> Result<Vec<char>> {
    Err(Error::Unsupported("logical drive letters"))
}

pub fn remembered_network_drives() -> Result<Vec<char>> {
    Err(Error::Unsupported("network drive mappings"))
}

/// The device file is opened as is (e.g. `/dev/sdb`).
pub fn raw_device_path(_disk: u32, device_file: &Path) -> PathBuf {
    device_file.to_path_buf()
}
