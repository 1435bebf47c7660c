//! Burns an image onto the single removable card attached to the host.
//!
//! Writing to the wrong device destroys data, so [`run`] refuses to write
//! unless exactly one healthy removable volume is present and it is the one
//! hosted by the requested disk. Everything up to the raw copy leaves the
//! card untouched apart from its drive letter, which is put back when the
//! user declines.

use crate::error::{Error, Result};
use crate::image;
use crate::registry::Diskpart;
use crate::write::Progress;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct BurnRequest {
    pub disk: u32,
    pub image: PathBuf,
    /// Read the device back and compare checksums after writing.
    pub verify: bool,
}

/// Everything the user needs to see before a burn is confirmed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BurnPlan {
    pub disk: u32,
    pub size: String,
    pub letter: char,
    pub volume: u32,
    /// Device file of the card, e.g. `/dev/sdb`.
    pub device: PathBuf,
    /// What actually gets opened for the raw copy.
    pub raw_device: PathBuf,
    pub image: PathBuf,
    pub image_len: u64,
}

impl fmt::Display for BurnPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Card Info")?;
        writeln!(f, "Disk:        {}", self.disk)?;
        writeln!(f, "Size:        {}", self.size)?;
        writeln!(f, "Drive:       {}:", self.letter)?;
        writeln!(f, "Volume:      {}", self.volume)?;
        writeln!(f, "Device:      {}", self.device.display())?;
        writeln!(f, "Raw device:  {}", self.raw_device.display())?;
        writeln!(f, "Image:       {}", self.image.display())?;
        write!(f, "Image size:  {} bytes", self.image_len)
    }
}

#[derive(Debug)]
pub struct BurnReport {
    pub plan: BurnPlan,
    pub written: u64,
    /// The letter the card was mounted at again, if that worked.
    pub letter: Option<char>,
}

/// Burns `request.image` onto `request.disk`.
///
/// With `confirm`, the plan is shown before anything is written and a `false`
/// answer aborts with [`Error::Declined`]. A write that fails part-way is
/// reported as [`Error::IncompleteWrite`]; the card is then in an undefined
/// state and nothing is retried.
pub fn run(
    diskpart: &Diskpart<'_>,
    request: &BurnRequest,
    confirm: Option<&dyn Fn(&BurnPlan) -> bool>,
    running: Arc<AtomicBool>,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<BurnReport> {
    let disk = request.disk;

    diskpart.rescan()?;
    if !diskpart.automount(true)? {
        warn!("automount is still disabled");
    }

    let mut detail = diskpart.detail(disk)?;
    let volume = detail
        .volume()
        .map(|v| v.index)
        .ok_or_else(|| Error::NotFound(format!("volume on disk {disk}")))?;
    let letter = match detail.letter() {
        Some(letter) => letter,
        None => {
            let letter = diskpart.assign_drive(volume, None)?;
            detail = diskpart.detail(disk)?;
            debug!(?detail, "refreshed disk detail");
            letter
        }
    };

    let prepared = image::prepare(&request.image, &running, on_progress)?;

    let removables = diskpart.list_removable()?;
    let entry = match removables.as_slice() {
        [] => return Err(Error::NotFound("healthy removable volume".to_string())),
        [entry] => entry,
        _ => return Err(Error::AmbiguousTarget(removables.len())),
    };
    if entry.index != volume || entry.disk.is_some_and(|d| d != disk) {
        return Err(Error::NotFound(format!(
            "disk {disk} is not the attached removable card"
        )));
    }
    let device = entry
        .device
        .clone()
        .ok_or_else(|| Error::NotFound(format!("device file of volume {volume}")))?;

    let plan = BurnPlan {
        disk,
        size: entry.size.clone(),
        letter,
        volume,
        raw_device: diskpart.host().raw_device_path(disk, &device),
        device,
        image: request.image.clone(),
        image_len: prepared.len(),
    };
    info!("burn plan:\n{plan}");

    if !diskpart.dismount_drive(letter) {
        warn!(%letter, "drive letter still assigned, writing anyway");
    }

    if let Some(confirm) = confirm {
        if !confirm(&plan) {
            if let Err(e) = diskpart.assign_drive(volume, Some(letter)) {
                error!(%letter, "could not restore drive letter: {e}");
            }
            return Err(Error::Declined(format!("burn onto disk {disk}")));
        }
    }

    let written = diskpart
        .host()
        .write_image(
            prepared.path(),
            &plan.raw_device,
            request.verify,
            running,
            on_progress,
        )
        .inspect_err(|e| error!(device = %plan.raw_device.display(), "burn failed: {e}"))?;
    info!(bytes = written, device = %plan.raw_device.display(), "image written");

    // The image is on the card; from here on failures only cost the mount.
    if let Err(e) = diskpart.rescan() {
        warn!("rescan after burn failed: {e}");
    }
    let letter = match diskpart.assign_drive(volume, Some(letter)) {
        Ok(letter) => Some(letter),
        Err(e) => {
            warn!(volume, "could not mount the burned card: {e}");
            None
        }
    };

    Ok(BurnReport {
        plan,
        written,
        letter,
    })
}
