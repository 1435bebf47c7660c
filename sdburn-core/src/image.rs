//! Prepares an image file for burning.
//!
//! Compressed images (`.gz`, `.xz`, `.zst`) are decompressed on-the-fly into a
//! temporary file, which is deleted when the [`PreparedImage`] is dropped.
//! Anything else is burned in place.
use crate::error::{Error, Result};
use crate::write::Progress;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::{NamedTempFile, TempPath};
use tracing::info;
use xz2::read::XzDecoder;
use zstd::stream::read::Decoder as ZstdDecoder;

/// An image ready to be copied byte for byte.
#[derive(Debug)]
pub struct PreparedImage {
    path: PathBuf,
    len: u64,
    _temp_handle: Option<TempPath>,
}

impl PreparedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the (decompressed) image in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_temporary(&self) -> bool {
        self._temp_handle.is_some()
    }
}

impl AsRef<Path> for PreparedImage {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Whether the file extension names a compression format we can unpack.
pub fn is_compressed(path: &Path) -> bool {
    matches!(extension(path).as_str(), "gz" | "gzip" | "xz" | "zst" | "zstd")
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Returns a path to the raw image, decompressing `input_path` first if needed.
///
/// `on_progress` receives [`Progress::DecompressStarted`] and
/// [`Progress::Decompressed`] events for compressed input only.
pub fn prepare(
    input_path: &Path,
    running: &AtomicBool,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<PreparedImage> {
    let input_file = File::open(input_path)?;

    let mut reader: Box<dyn Read> = match extension(input_path).as_str() {
        "gz" | "gzip" => Box::new(GzDecoder::new(BufReader::new(input_file))),
        "xz" => Box::new(XzDecoder::new(BufReader::new(input_file))),
        "zst" | "zstd" => Box::new(ZstdDecoder::new(BufReader::new(input_file))?),
        _ => {
            return Ok(PreparedImage {
                path: input_path.to_path_buf(),
                len: fs::metadata(input_path)?.len(),
                _temp_handle: None,
            });
        }
    };

    info!(image = %input_path.display(), "decompressing image");
    on_progress(Progress::DecompressStarted);

    let mut temp_file = NamedTempFile::new()?;
    let mut total: u64 = 0;
    {
        let mut writer = BufWriter::new(&mut temp_file);
        let mut buffer = [0u8; 8192];

        loop {
            if !running.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }

            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            writer.write_all(&buffer[..n])?;
            total += n as u64;
            on_progress(Progress::Decompressed(total));
        }
        writer.flush()?;
    }

    let temp_path = temp_file.into_temp_path();
    Ok(PreparedImage {
        path: temp_path.to_path_buf(),
        len: total,
        _temp_handle: Some(temp_path),
    })
}
