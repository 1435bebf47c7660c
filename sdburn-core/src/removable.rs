//! Narrows the registry's view down to the healthy removable volumes that are
//! candidates for a burn.

use crate::device::{DeviceFile, DiskDetail, VolumeRecord};
use crate::error::Result;
use crate::registry::Diskpart;
use std::path::PathBuf;
use tracing::{debug, info, warn};

fn healthy_removable(volumes: Vec<VolumeRecord>) -> Vec<VolumeRecord> {
    volumes
        .into_iter()
        .filter(|v| v.is_removable() && v.is_healthy())
        .collect()
}

fn device_for(volume: &VolumeRecord, files: &[DeviceFile]) -> Option<PathBuf> {
    let letter = volume.letter?;
    files
        .iter()
        .find(|file| file.letter == Some(letter))
        .map(DeviceFile::disk_path)
}

impl Diskpart<'_> {
    /// Healthy removable volumes, each mounted at a letter and annotated with
    /// its raw device file and owning disk where those can be resolved.
    ///
    /// Volumes without a letter get one assigned on the way. The result is
    /// returned as is even when it holds zero or several entries; callers
    /// that need a single target must refuse anything else.
    pub fn list_removable(&self) -> Result<Vec<VolumeRecord>> {
        self.rescan()?;
        let disks = self.list_disks()?;
        let removables = healthy_removable(self.list_volumes()?);

        let details: Vec<DiskDetail> = disks
            .iter()
            .filter_map(|disk| match self.detail(disk.index) {
                Ok(detail) => Some(detail),
                Err(e) => {
                    debug!(disk = disk.index, "skipping disk detail: {e}");
                    None
                }
            })
            .collect();

        for volume in removables.iter().filter(|v| v.letter.is_none()) {
            let letter = self.assign_drive(volume.index, None)?;
            info!(volume = volume.index, %letter, "mounted removable volume");
        }

        let device_files = self.list_device_files()?;
        let mut removables = healthy_removable(self.list_volumes()?);

        for volume in &mut removables {
            volume.device = device_for(volume, &device_files);
            if volume.device.is_none() {
                debug!(volume = volume.index, "no device file for volume");
            }

            volume.disk = details
                .iter()
                .find(|detail| detail.hosts_volume(volume.index))
                .map(|detail| detail.disk);
            if volume.disk.is_none() {
                warn!(
                    volume = volume.index,
                    "could not associate removable volume with a disk"
                );
            }
        }

        match removables.len() {
            0 => warn!("no healthy removable SD card detected"),
            1 => {}
            n => warn!(
                count = n,
                "too many removable devices found; remove all except the one to burn"
            ),
        }
        Ok(removables)
    }
}
