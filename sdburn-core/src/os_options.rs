#[cfg(unix)]
pub(crate) use std::os::unix::fs::OpenOptionsExt;
#[cfg(windows)]
pub(crate) use std::os::windows::fs::OpenOptionsExt;

/// Open flags bypassing the page cache for raw device I/O.
#[cfg(target_os = "linux")]
pub(crate) const DIRECT_IO: i32 = libc::O_DIRECT;

// macOS and the BSDs have no O_DIRECT; buffered I/O plus the final sync is used.
#[cfg(all(unix, not(target_os = "linux")))]
pub(crate) const DIRECT_IO: i32 = 0;

#[cfg(windows)]
pub(crate) const DIRECT_IO: u32 = windows_sys::Win32::Storage::FileSystem::FILE_FLAG_NO_BUFFERING
    | windows_sys::Win32::Storage::FileSystem::FILE_FLAG_WRITE_THROUGH;
