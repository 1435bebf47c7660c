//! Typed views of the rows reported by `diskpart`, `wmic` and `/proc/partitions`.
//!
//! Every record is a snapshot of one enumeration. Disk and volume indices are
//! assigned by the OS and only mean something until the next rescan.

use crate::error::{Error, Result};
use crate::table::Record;
use std::fmt;
use std::path::PathBuf;

fn index(row: &Record, key: &str, what: &'static str) -> Result<u32> {
    row.value(key).parse().map_err(|_| Error::Malformed {
        what,
        detail: format!("{key} is {:?} in {row:?}", row.value(key)),
    })
}

fn letter(value: &str) -> Option<char> {
    value
        .chars()
        .next()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
}

/// A row of `list disk`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskRecord {
    pub index: u32,
    /// "Online", "No Media", "Offline", ...
    pub status: String,
    pub size: String,
    pub free: String,
    pub dynamic: bool,
    pub gpt: bool,
}

impl TryFrom<&Record> for DiskRecord {
    type Error = Error;

    fn try_from(row: &Record) -> Result<Self> {
        Ok(Self {
            index: index(row, "###", "disk row")?,
            status: row.value("Status").to_string(),
            size: row.value("Size").to_string(),
            free: row.value("Free").to_string(),
            dynamic: row.value("Dyn") == "*",
            gpt: row.value("Gpt") == "*",
        })
    }
}

/// A row of `list volume`, optionally enriched with its disk and device file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeRecord {
    pub index: u32,
    pub letter: Option<char>,
    pub label: String,
    pub fs: String,
    /// "Removable", "Partition", "DVD-ROM", ...
    pub kind: String,
    pub size: String,
    /// "Healthy", "No Media", ...
    pub status: String,
    pub info: String,
    /// The owning disk, when it could be resolved through a disk detail query.
    pub disk: Option<u32>,
    /// The raw device file (e.g. `/dev/sdb`), when it could be resolved.
    pub device: Option<PathBuf>,
}

impl VolumeRecord {
    pub fn is_removable(&self) -> bool {
        self.kind == "Removable"
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "Healthy"
    }

    pub fn is_offline(&self) -> bool {
        self.info.contains("Offline")
    }
}

impl TryFrom<&Record> for VolumeRecord {
    type Error = Error;

    fn try_from(row: &Record) -> Result<Self> {
        Ok(Self {
            index: index(row, "###", "volume row")?,
            letter: letter(row.value("Ltr")),
            label: row.value("Label").to_string(),
            fs: row.value("Fs").to_string(),
            kind: row.value("Type").to_string(),
            size: row.value("Size").to_string(),
            status: row.value("Status").to_string(),
            info: row.value("Info").to_string(),
            disk: None,
            device: None,
        })
    }
}

impl fmt::Display for VolumeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = self
            .letter
            .map_or_else(|| "-".to_string(), |l| format!("{l}:"));
        let disk = self.disk.map_or_else(|| "?".to_string(), |d| d.to_string());
        let device = self
            .device
            .as_ref()
            .map_or_else(|| "(unknown)".to_string(), |d| d.display().to_string());

        write!(
            f,
            "Volume {:<3} {:<3} {:<12} {:<6} {:>8}  disk {:<3} {}",
            self.index, letter, self.label, self.fs, self.size, disk, device
        )
    }
}

/// A row of `list partition`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionRecord {
    pub index: u32,
    pub kind: String,
    pub size: String,
    pub offset: String,
}

impl TryFrom<&Record> for PartitionRecord {
    type Error = Error;

    fn try_from(row: &Record) -> Result<Self> {
        Ok(Self {
            index: index(row, "###", "partition row")?,
            kind: row.value("Type").to_string(),
            size: row.value("Size").to_string(),
            offset: row.value("Offset").to_string(),
        })
    }
}

/// A row of `wmic diskdrive get ...`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriveRecord {
    pub index: u32,
    pub interface_type: String,
    pub media_type: String,
    pub model: String,
    pub partitions: u32,
    /// Size in bytes; card readers without media report nothing.
    pub size: Option<u64>,
    pub status: String,
}

impl DriveRecord {
    pub fn is_removable(&self) -> bool {
        self.media_type.contains("Removable")
    }
}

impl TryFrom<&Record> for DriveRecord {
    type Error = Error;

    fn try_from(row: &Record) -> Result<Self> {
        Ok(Self {
            index: index(row, "Index", "drive row")?,
            interface_type: row.value("InterfaceType").to_string(),
            media_type: row.value("MediaType").to_string(),
            model: row.value("Model").to_string(),
            partitions: row.value("Partitions").parse().unwrap_or(0),
            size: row.value("Size").parse().ok(),
            status: row.value("Status").to_string(),
        })
    }
}

/// A removable drive joined with its `list disk` row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemovableDisk {
    pub drive: DriveRecord,
    pub disk: DiskRecord,
}

impl fmt::Display for RemovableDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size_gb = self
            .drive
            .size
            .map_or(0.0, |bytes| bytes as f64 / (1024.0 * 1024.0 * 1024.0));
        write!(
            f,
            "Disk {:<3} {:<6} {:<18} {:<36} {:>6.1} GB  {}",
            self.drive.index,
            self.drive.interface_type,
            self.drive.media_type,
            self.drive.model,
            size_gb,
            self.disk.status
        )
    }
}

/// The merged result of `select disk N` / `detail disk`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiskDetail {
    pub disk: u32,
    /// The free-text line naming the device, e.g. "SDHC Card USB Device".
    pub description: Option<String>,
    /// `key : value` lines of the preamble, in output order.
    pub attributes: Vec<(String, String)>,
    /// The volume table under the preamble. Its `###` column is the volume
    /// number, not a disk number.
    pub volumes: Vec<VolumeRecord>,
}

impl DiskDetail {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The first volume on the disk.
    pub fn volume(&self) -> Option<&VolumeRecord> {
        self.volumes.first()
    }

    pub fn letter(&self) -> Option<char> {
        self.volume().and_then(|v| v.letter)
    }

    pub fn hosts_volume(&self, volume: u32) -> bool {
        self.volumes.iter().any(|v| v.index == volume)
    }
}

/// Device families named `<disk><n>p<m>` for partition `m` of disk `<disk><n>`.
const PARTITION_P_PREFIXES: [&str; 3] = ["mmcblk", "nvme", "loop"];

/// A row of `/proc/partitions`.
///
/// Under the Windows POSIX compatibility layer the table carries an extra
/// `win-mounts` column with the drive letter of mounted partitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceFile {
    pub major: u32,
    pub minor: u32,
    pub blocks: u64,
    /// Kernel name, e.g. "sdb1".
    pub name: String,
    pub letter: Option<char>,
}

impl DeviceFile {
    /// The whole-disk name, e.g. "sdb" for "sdb1" and "mmcblk0" for
    /// "mmcblk0p1".
    ///
    /// Disks whose kernel name ends in a digit separate the partition number
    /// with a `p`; their unpartitioned name is already the disk.
    pub fn disk_name(&self) -> &str {
        let name = self.name.as_str();
        if PARTITION_P_PREFIXES.iter().any(|p| name.starts_with(p)) {
            return match name.rsplit_once('p') {
                Some((disk, number))
                    if !number.is_empty()
                        && number.chars().all(|c| c.is_ascii_digit())
                        && disk.ends_with(|c: char| c.is_ascii_digit()) =>
                {
                    disk
                }
                _ => name,
            };
        }
        name.trim_end_matches(|c: char| c.is_ascii_digit())
    }

    /// The raw whole-disk device file, e.g. `/dev/sdb`.
    pub fn disk_path(&self) -> PathBuf {
        PathBuf::from("/dev").join(self.disk_name())
    }

    /// Parses the whole `/proc/partitions` listing. The header and any line
    /// that does not start with numeric major/minor numbers are skipped.
    pub fn parse_listing(text: &str) -> Vec<DeviceFile> {
        text.lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let major = fields.next()?.parse().ok()?;
                let minor = fields.next()?.parse().ok()?;
                let blocks = fields.next()?.parse().ok()?;
                let name = fields.next()?.to_string();
                Some(DeviceFile {
                    major,
                    minor,
                    blocks,
                    name,
                    letter: fields.next().and_then(letter),
                })
            })
            .collect()
    }
}
