//! Read-only queries over `diskpart`, `wmic` and `/proc/partitions`.
//!
//! Rows that cannot be interpreted are logged and dropped: a partial listing
//! is more useful than none. The queries never change device state.

use crate::config::JoinPolicy;
use crate::device::{
    DeviceFile, DiskDetail, DiskRecord, DriveRecord, PartitionRecord, RemovableDisk, VolumeRecord,
};
use crate::error::{Error, Result};
use crate::host::Host;
use crate::table::{self, Record, TableLayout};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Columns requested from `wmic diskdrive`.
pub const DRIVE_FIELDS: &[&str] = &[
    "Index",
    "InterfaceType",
    "MediaType",
    "Model",
    "Partitions",
    "Size",
    "Status",
];

/// Entry point to the disk layer. Queries live here; the mutating operations
/// are in [`crate::volume`] and [`crate::removable`].
#[derive(Clone, Copy)]
pub struct Diskpart<'h> {
    host: &'h dyn Host,
    join: JoinPolicy,
}

impl<'h> Diskpart<'h> {
    pub fn new(host: &'h dyn Host) -> Self {
        Self {
            host,
            join: JoinPolicy::default(),
        }
    }

    pub fn with_join_policy(mut self, join: JoinPolicy) -> Self {
        self.join = join;
        self
    }

    pub fn host(&self) -> &'h dyn Host {
        self.host
    }

    pub(crate) fn run(&self, script: &str) -> Result<String> {
        self.host.diskpart(script)
    }

    pub fn list_disks(&self) -> Result<Vec<DiskRecord>> {
        let output = self.run("list disk")?;
        Ok(rows(&table::parse(&output, TableLayout::new("Disk"))))
    }

    pub fn list_volumes(&self) -> Result<Vec<VolumeRecord>> {
        let output = self.run("list volume")?;
        Ok(rows(&table::parse(&output, TableLayout::new("Volume"))))
    }

    /// Partitions of `disk`; `None` if the query failed. A disk without
    /// partitions yields an empty list.
    pub fn list_partitions(&self, disk: u32) -> Option<Vec<PartitionRecord>> {
        match self.run(&format!("select disk {disk}\nlist partition")) {
            Ok(output) => Some(rows(&table::parse(
                &output,
                TableLayout::new("Partition"),
            ))),
            Err(e) => {
                warn!(disk, "could not list partitions: {e}");
                None
            }
        }
    }

    pub fn detail(&self, disk: u32) -> Result<DiskDetail> {
        let output = self.run(&format!("select disk {disk}\ndetail disk"))?;
        parse_detail(disk, &output)
    }

    /// The `wmic diskdrive` listing.
    pub fn drives(&self) -> Result<Vec<DriveRecord>> {
        let output = self.host.wmic_diskdrive(DRIVE_FIELDS)?;
        let records: Vec<Record> = table::parse(
            &output,
            TableLayout::new("Index").skip_after_header(0).trailing(0),
        )
        .into_iter()
        .filter(|row| !row.value("Index").is_empty())
        .collect();
        Ok(rows(&records))
    }

    /// Removable drives keyed by disk index, each joined with its `list disk`
    /// row. A drive missing from either listing is left out under
    /// [`JoinPolicy::Lenient`] and fails the query under [`JoinPolicy::Strict`].
    pub fn removable_disk_info(&self) -> Result<BTreeMap<u32, RemovableDisk>> {
        let mut disks: BTreeMap<u32, DiskRecord> = self
            .list_disks()?
            .into_iter()
            .map(|disk| (disk.index, disk))
            .collect();

        let mut result = BTreeMap::new();
        for drive in self.drives()? {
            let Some(disk) = disks.remove(&drive.index) else {
                self.unmatched(format!("drive {} is not in the disk listing", drive.index))?;
                continue;
            };
            if drive.is_removable() {
                result.insert(drive.index, RemovableDisk { drive, disk });
            }
        }

        for index in disks.keys() {
            self.unmatched(format!("disk {index} is not in the drive listing"))?;
        }
        Ok(result)
    }

    fn unmatched(&self, message: String) -> Result<()> {
        match self.join {
            JoinPolicy::Lenient => {
                warn!("{message}; skipping it");
                Ok(())
            }
            JoinPolicy::Strict => Err(Error::NotFound(message)),
        }
    }

    pub fn list_device_files(&self) -> Result<Vec<DeviceFile>> {
        Ok(DeviceFile::parse_listing(&self.host.proc_partitions()?))
    }

    /// The volume currently mounted at `letter`.
    pub fn volume_by_letter(&self, letter: char) -> Result<Option<VolumeRecord>> {
        let letter = letter.to_ascii_uppercase();
        Ok(self
            .list_volumes()?
            .into_iter()
            .find(|volume| volume.letter == Some(letter)))
    }

    /// Every removable volume, whatever its health or mount state.
    pub fn removable_volumes(&self) -> Result<Vec<VolumeRecord>> {
        Ok(self
            .list_volumes()?
            .into_iter()
            .filter(VolumeRecord::is_removable)
            .collect())
    }
}

fn rows<T>(records: &[Record]) -> Vec<T>
where
    T: for<'a> TryFrom<&'a Record, Error = Error>,
{
    records
        .iter()
        .filter_map(|record| match T::try_from(record) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!("dropping row: {e}");
                None
            }
        })
        .collect()
}

/// Splits `detail disk` output into its preamble and its volume table.
///
/// ```text
/// Disk 1 is now the selected disk.
///
/// SDHC Card USB Device
/// Disk ID: 00000000
/// Type   : USB
/// ...
///
///   Volume ###  Ltr  Label        Fs     Type        Size     Status     Info
///   ----------  ---  -----------  -----  ----------  -------  ---------  --------
///   Volume 3     E   boot         FAT32  Removable    256 MB  Healthy
/// ```
pub fn parse_detail(disk: u32, output: &str) -> Result<DiskDetail> {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines
        .iter()
        .position(|line| line.contains("is now the selected disk"))
        .map_or(0, |i| i + 1);
    let table_start = lines[start..]
        .iter()
        .position(|line| line.trim().starts_with("Volume ###"))
        .map_or(lines.len(), |i| start + i);

    let mut detail = DiskDetail {
        disk,
        ..DiskDetail::default()
    };
    for line in lines[start..table_start]
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
    {
        match line.split_once(':') {
            Some((key, value)) => detail
                .attributes
                .push((key.trim().to_string(), value.trim().to_string())),
            None if detail.description.is_none() && detail.attributes.is_empty() => {
                detail.description = Some(line.to_string());
            }
            None => debug!(disk, line, "ignoring detail line"),
        }
    }

    if detail.attributes.is_empty() {
        return Err(Error::NotFound(format!("disk {disk} reported no details")));
    }

    let table = lines[table_start..].join("\n");
    detail.volumes = rows::<VolumeRecord>(&table::parse(&table, TableLayout::new("Volume")))
        .into_iter()
        .map(|volume| VolumeRecord {
            disk: Some(disk),
            ..volume
        })
        .collect();

    Ok(detail)
}
