//! Contains the raw block copy of an image onto a device.
//!
//! The copy reads the image in fixed-size chunks, writes them to the device
//! opened for direct I/O, and syncs the device before returning. An optional
//! verification pass reads the device back and compares SHA-256 digests.
use crate::error::{Error, Result};
use crate::os_options::{DIRECT_IO, OpenOptionsExt};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Direct I/O transfers must be multiples of the sector size.
const SECTOR_SIZE: usize = 512;
/// Buffer alignment accepted by every direct I/O implementation we target.
const BUFFER_ALIGN: usize = 4096;

/// Progress events reported while preparing, writing, verifying or reading
/// an image. Sizes and positions are in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    DecompressStarted,
    Decompressed(u64),
    WriteStarted(u64),
    Written(u64),
    VerifyStarted(u64),
    Verified(u64),
    ReadStarted(u64),
    Read(u64),
}

/// A zeroed buffer whose usable slice is aligned for direct I/O.
pub(crate) struct AlignedBuffer {
    storage: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedBuffer {
    pub(crate) fn new(len: usize) -> Self {
        let storage = vec![0u8; len + BUFFER_ALIGN];
        let offset = storage.as_ptr().align_offset(BUFFER_ALIGN);
        Self {
            storage,
            offset,
            len,
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }
}

fn check_running(running: &AtomicBool) -> Result<()> {
    if running.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(Error::Cancelled)
    }
}

/// Copies `len` bytes from `image` to `device`. The last chunk is padded with
/// zeros up to a sector boundary. On failure the error carries the number of
/// bytes already written.
fn copy_chunks<R: Read, W: Write>(
    image: &mut R,
    device: &mut W,
    len: u64,
    buffer: &mut [u8],
    running: &AtomicBool,
    on_progress: &mut dyn FnMut(Progress),
) -> std::result::Result<u64, (u64, Error)> {
    let mut written: u64 = 0;
    while written < len {
        let to_read = std::cmp::min(buffer.len() as u64, len - written) as usize;
        if let Err(e) = check_running(running)
            .and_then(|_| copy_chunk(image, device, buffer, to_read))
        {
            return Err((written, e));
        }
        written += to_read as u64;
        on_progress(Progress::Written(written));
    }
    Ok(written)
}

fn copy_chunk<R: Read, W: Write>(
    image: &mut R,
    device: &mut W,
    buffer: &mut [u8],
    len: usize,
) -> Result<()> {
    image.read_exact(&mut buffer[..len])?;

    let padded = len.div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
    buffer[len..padded].fill(0);

    device.write_all(&buffer[..padded])?;
    Ok(())
}

/// Reads `len` bytes from both streams and fails unless their digests match.
fn compare_streams<A: Read, B: Read>(
    image: &mut A,
    device: &mut B,
    len: u64,
    chunk_size: usize,
    running: &AtomicBool,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<()> {
    let mut image_hasher = Sha256::new();
    let mut device_hasher = Sha256::new();
    let mut image_buf = vec![0u8; chunk_size];
    let mut device_buf = vec![0u8; chunk_size];

    let mut remaining = len;
    while remaining > 0 {
        check_running(running)?;

        let chunk = std::cmp::min(chunk_size as u64, remaining) as usize;
        image.read_exact(&mut image_buf[..chunk])?;
        device.read_exact(&mut device_buf[..chunk])?;

        image_hasher.update(&image_buf[..chunk]);
        device_hasher.update(&device_buf[..chunk]);

        remaining -= chunk as u64;
        on_progress(Progress::Verified(len - remaining));
    }

    if image_hasher.finalize() != device_hasher.finalize() {
        return Err(Error::VerificationFailed);
    }
    Ok(())
}

/// Writes an image file to a raw device, with optional verification.
///
/// # Arguments
///
/// * `image_path` - Path to the (uncompressed) image.
/// * `device_path` - Path to the raw target device.
/// * `chunk_size` - Bytes per read/write; rounded down to a sector multiple.
/// * `verify` - If `true`, the device is read back and compared afterwards.
/// * `running` - Cleared by the caller to cancel the operation.
/// * `on_progress` - Receives [`Progress::WriteStarted`], [`Progress::Written`]
///   and, when verifying, [`Progress::VerifyStarted`] and [`Progress::Verified`].
///
/// # Errors
///
/// Errors raised before the device is opened leave it untouched. Once the
/// device is open any failure, cancellation included, is reported as
/// [`Error::IncompleteWrite`]: the device content is then undefined.
pub fn run(
    image_path: &Path,
    device_path: &Path,
    chunk_size: usize,
    verify: bool,
    running: Arc<AtomicBool>,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<u64> {
    let mut image_file = File::open(image_path)?;
    let image_len = image_file.metadata()?.len();
    let chunk_size = std::cmp::max(chunk_size / SECTOR_SIZE, 1) * SECTOR_SIZE;

    check_running(&running)?;
    let mut device_file = OpenOptions::new()
        .write(true)
        .custom_flags(DIRECT_IO)
        .open(device_path)?;

    info!(
        image = %image_path.display(),
        device = %device_path.display(),
        bytes = image_len,
        "writing image"
    );
    on_progress(Progress::WriteStarted(image_len));

    let mut buffer = AlignedBuffer::new(chunk_size);
    let copied = copy_chunks(
        &mut image_file,
        &mut device_file,
        image_len,
        buffer.as_mut_slice(),
        &running,
        on_progress,
    )
    .and_then(|written| {
        device_file
            .sync_all()
            .map(|_| written)
            .map_err(|e| (written, e.into()))
    });

    let written = copied.map_err(|(written, source)| Error::IncompleteWrite {
        device: device_path.to_path_buf(),
        written,
        total: image_len,
        source: Box::new(source),
    })?;
    debug!(written, "image written and synced");

    if verify {
        let mut image_file = File::open(image_path)?;
        let mut device_file = File::open(device_path)?;

        on_progress(Progress::VerifyStarted(image_len));
        compare_streams(
            &mut image_file,
            &mut device_file,
            image_len,
            chunk_size,
            &running,
            on_progress,
        )?;
        info!(device = %device_path.display(), "verification passed");
    }

    Ok(written)
}
