use std::path::PathBuf;

/// Read/write chunk size of the raw block copy.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// What to do when a device shows up in one listing but not in the other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Log the unmatched device and leave it out of the merged view.
    #[default]
    Lenient,
    /// Fail the whole query with [`crate::Error::NotFound`].
    Strict,
}

/// Locations of the external tools and tunables of the disk layer.
#[derive(Clone, Debug)]
pub struct Config {
    pub diskpart: PathBuf,
    pub wmic: PathBuf,
    /// POSIX shell of the compatibility layer, used to read `/proc/partitions`.
    pub shell: PathBuf,
    pub join: JoinPolicy,
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            diskpart: PathBuf::from(r"C:\Windows\System32\diskpart.exe"),
            wmic: PathBuf::from("wmic"),
            shell: PathBuf::from("sh"),
            join: JoinPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}
