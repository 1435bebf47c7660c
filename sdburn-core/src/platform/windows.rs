use crate::error::Result;
use std::ffi::c_void;
use std::io;
use std::path::{Path, PathBuf};
use windows_sys::Win32::Foundation::{ERROR_NO_MORE_ITEMS, NO_ERROR};
use windows_sys::Win32::NetworkManagement::WNet::{
    NETRESOURCEW, RESOURCE_REMEMBERED, RESOURCETYPE_DISK, WNetCloseEnum, WNetEnumResourceW,
    WNetOpenEnumW,
};
use windows_sys::Win32::Storage::FileSystem::GetLogicalDrives;

/// Letters set in the `GetLogicalDrives` bitmask.
pub fn logical_drives() -> Result<Vec<char>> {
    let mask = unsafe { GetLogicalDrives() };
    if mask == 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(('A'..='Z')
        .enumerate()
        .filter(|(bit, _)| mask & (1u32 << bit) != 0)
        .map(|(_, letter)| letter)
        .collect())
}

/// Reads a NUL-terminated UTF-16 string.
unsafe fn wide_to_string(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while unsafe { *ptr.add(len) } != 0 {
        len += 1;
    }
    String::from_utf16_lossy(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Local letters of persistent network mappings, including disconnected ones.
pub fn remembered_network_drives() -> Result<Vec<char>> {
    let mut handle = unsafe { std::mem::zeroed() };
    let status = unsafe {
        WNetOpenEnumW(
            RESOURCE_REMEMBERED,
            RESOURCETYPE_DISK,
            0,
            std::ptr::null(),
            &mut handle,
        )
    };
    if status != NO_ERROR {
        return Err(io::Error::from_raw_os_error(status as i32).into());
    }

    let mut letters = Vec::new();
    // u64 storage keeps the NETRESOURCEW entries aligned.
    let mut buffer = vec![0u64; 2048];
    let result = loop {
        let mut count = u32::MAX;
        let mut size = (buffer.len() * std::mem::size_of::<u64>()) as u32;
        let status = unsafe {
            WNetEnumResourceW(
                handle,
                &mut count,
                buffer.as_mut_ptr() as *mut c_void,
                &mut size,
            )
        };
        if status == ERROR_NO_MORE_ITEMS {
            break Ok(letters);
        }
        if status != NO_ERROR {
            break Err(io::Error::from_raw_os_error(status as i32).into());
        }

        let entries = buffer.as_ptr() as *const NETRESOURCEW;
        for i in 0..count as usize {
            let local = unsafe { wide_to_string((*entries.add(i)).lpLocalName) };
            let mut chars = local.chars();
            if let (Some(letter), Some(':'), None) = (chars.next(), chars.next(), chars.next()) {
                letters.push(letter.to_ascii_uppercase());
            }
        }
    };

    unsafe { WNetCloseEnum(handle) };
    result
}

/// Windows exposes whole disks as `\\.\PhysicalDriveN`; the POSIX device file
/// only exists inside the compatibility layer.
pub fn raw_device_path(disk: u32, _device_file: &Path) -> PathBuf {
    PathBuf::from(format!(r"\\.\PhysicalDrive{disk}"))
}
