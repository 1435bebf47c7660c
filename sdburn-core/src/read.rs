//! Backs up a raw device into an image file.
use crate::error::{Error, Result};
use crate::os_options::{DIRECT_IO, OpenOptionsExt};
use crate::write::{AlignedBuffer, Progress};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

// Use a 1 MiB buffer for I/O operations.
const BUFFER_SIZE: usize = 1024 * 1024;

#[cfg(target_os = "linux")]
nix::ioctl_read!(blkgetsize64, 0x12, 114, u64);

/// Size of the block device in bytes.
#[cfg(target_os = "linux")]
fn device_size(file: &mut File) -> Result<u64> {
    use std::os::unix::io::AsRawFd;

    let mut size_bytes: u64 = 0;
    unsafe { blkgetsize64(file.as_raw_fd(), &mut size_bytes) }.map_err(std::io::Error::from)?;
    Ok(size_bytes)
}

#[cfg(not(target_os = "linux"))]
fn device_size(file: &mut File) -> Result<u64> {
    use std::io::{Seek, SeekFrom};

    let size_bytes = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;
    Ok(size_bytes)
}

/// Reads the entire contents of a raw device into `image_path`.
///
/// `on_progress` receives [`Progress::ReadStarted`] with the device size, then
/// [`Progress::Read`] after every chunk. A cancelled backup removes the
/// partial image.
pub fn run(
    device_path: &Path,
    image_path: &Path,
    running: Arc<AtomicBool>,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<u64> {
    let mut device_file = OpenOptions::new()
        .read(true)
        .custom_flags(DIRECT_IO)
        .open(device_path)?;

    let size_bytes = device_size(&mut device_file)?;
    if size_bytes == 0 {
        return Err(Error::NotFound(format!(
            "no media in {} (size reported as zero)",
            device_path.display()
        )));
    }

    info!(
        device = %device_path.display(),
        image = %image_path.display(),
        bytes = size_bytes,
        "backing up device"
    );
    on_progress(Progress::ReadStarted(size_bytes));

    let mut image_file = File::create(image_path)?;
    let mut buffer = AlignedBuffer::new(BUFFER_SIZE);
    let buffer = buffer.as_mut_slice();

    let mut read_total: u64 = 0;
    while read_total < size_bytes {
        if !running.load(Ordering::SeqCst) {
            drop(image_file);
            fs::remove_file(image_path)?;
            return Err(Error::Cancelled);
        }

        let to_read = std::cmp::min(BUFFER_SIZE as u64, size_bytes - read_total) as usize;

        device_file.read_exact(&mut buffer[..to_read])?;
        image_file.write_all(&buffer[..to_read])?;

        read_total += to_read as u64;
        on_progress(Progress::Read(read_total));
    }

    image_file.sync_all()?;
    Ok(read_total)
}
