//! Volume lifecycle: selecting, mounting (assigning a drive letter),
//! unmounting, formatting and bringing volumes online.
//!
//! Every operation is a single diskpart invocation. Mount state and online
//! state are independent: a volume goes Unassigned → Assigned through
//! [`Diskpart::assign_drive`] and back through [`Diskpart::remove_drive`],
//! and Offline → Online through [`Diskpart::online`].

use crate::error::{Error, Result};
use crate::registry::Diskpart;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Label given to the single exFAT partition created by [`Diskpart::format`].
pub const FORMAT_LABEL: &str = "UNTITLED";

/// Letters never handed out: A and B belong to legacy floppy drives.
const RESERVED_LETTERS: [char; 2] = ['A', 'B'];

/// Asks the user to confirm a destructive step; `true` means proceed.
pub type Confirm<'a> = &'a dyn Fn(&str) -> bool;

/// The object a diskpart command applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    Disk(u32),
    Partition(u32),
    Volume(u32),
}

impl Selection {
    /// Builds a selection from optional identifiers, exactly one of which
    /// must be given.
    pub fn from_parts(
        disk: Option<u32>,
        partition: Option<u32>,
        volume: Option<u32>,
    ) -> Result<Self> {
        match (disk, partition, volume) {
            (Some(disk), None, None) => Ok(Self::Disk(disk)),
            (None, Some(partition), None) => Ok(Self::Partition(partition)),
            (None, None, Some(volume)) => Ok(Self::Volume(volume)),
            _ => Err(Error::InvalidArgument(
                "select exactly one of disk, partition or volume".to_string(),
            )),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disk(n) => write!(f, "select disk {n}"),
            Self::Partition(n) => write!(f, "select partition {n}"),
            Self::Volume(n) => write!(f, "select volume {n}"),
        }
    }
}

/// Outcome of a step whose failure does not stop the surrounding operation.
#[derive(Debug)]
pub enum BestEffort {
    Succeeded,
    /// Nothing to do: the target was already in the requested state.
    AlreadyInState,
    Failed(Error),
}

impl BestEffort {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    fn from_result<T>(result: Result<T>) -> Self {
        match result {
            Ok(_) => Self::Succeeded,
            Err(e) => Self::Failed(e),
        }
    }
}

/// The alphabetically first letter from C to Z that is not in `in_use`.
pub fn pick_free_letter(in_use: impl IntoIterator<Item = char>) -> Option<char> {
    let mut free: BTreeSet<char> = ('A'..='Z')
        .filter(|c| !RESERVED_LETTERS.contains(c))
        .collect();
    for letter in in_use {
        free.remove(&letter.to_ascii_uppercase());
    }
    free.into_iter().next()
}

fn drive_letter(letter: char) -> Result<char> {
    let letter = letter.to_ascii_uppercase();
    if letter.is_ascii_uppercase() {
        Ok(letter)
    } else {
        Err(Error::InvalidArgument(format!(
            "{letter:?} is not a drive letter"
        )))
    }
}

impl Diskpart<'_> {
    pub fn select(&self, selection: Selection) -> Result<String> {
        self.run(&selection.to_string())
    }

    /// Forces the OS to enumerate attached storage again.
    pub fn rescan(&self) -> Result<()> {
        debug!("rescanning disks");
        self.run("rescan").map(|_| ())
    }

    /// Turns automatic mounting of new volumes on or off. Returns whether the
    /// tool now reports it enabled.
    pub fn automount(&self, enable: bool) -> Result<bool> {
        let mode = if enable { "enable" } else { "disable" };
        let output = self.run(&format!("automount {mode}"))?;
        Ok(output.contains("enabled"))
    }

    /// A letter bound neither to a logical drive nor to a remembered network
    /// mapping, or `None` once C to Z are all taken.
    pub fn guess_drive(&self) -> Result<Option<char>> {
        let host = self.host();
        let logical = host.logical_drives()?;
        let network = host.remembered_network_drives()?;
        Ok(pick_free_letter(logical.into_iter().chain(network)))
    }

    /// Mounts `volume` at `letter`, or at [`Diskpart::guess_drive`]'s pick.
    /// Returns the letter used.
    pub fn assign_drive(&self, volume: u32, letter: Option<char>) -> Result<char> {
        let letter = match letter {
            Some(letter) => drive_letter(letter)?,
            None => self
                .guess_drive()?
                .ok_or_else(|| Error::NotFound("free drive letter".to_string()))?,
        };
        self.run(&format!(
            "{}\nassign letter={letter}",
            Selection::Volume(volume)
        ))?;
        info!(volume, %letter, "assigned drive letter");
        Ok(letter)
    }

    /// Unmounts the volume at `letter`. Failures are reported, not raised;
    /// returns whether the letter was removed.
    pub fn remove_drive(&self, letter: char) -> bool {
        self.unmount(letter, false)
    }

    /// Like [`Diskpart::remove_drive`], and also takes the volume offline so
    /// the raw disk underneath can be opened for writing.
    pub fn dismount_drive(&self, letter: char) -> bool {
        self.unmount(letter, true)
    }

    fn unmount(&self, letter: char, dismount: bool) -> bool {
        let removed = drive_letter(letter).and_then(|letter| {
            let volume = self
                .volume_by_letter(letter)?
                .ok_or_else(|| Error::NotFound(format!("volume at {letter}:")))?;
            let suffix = if dismount { " dismount" } else { "" };
            self.run(&format!(
                "{}\nremove letter={letter}{suffix}",
                Selection::Volume(volume.index)
            ))?;
            info!(volume = volume.index, %letter, dismount, "removed drive letter");
            Ok(())
        });

        match removed {
            Ok(()) => true,
            Err(e) => {
                error!("could not remove drive {letter}: {e}");
                false
            }
        }
    }

    /// Removes every partition of `disk`. A disk without partitions is left
    /// alone; a failing clean is returned, not raised.
    pub fn clean(&self, disk: u32) -> BestEffort {
        if self.list_partitions(disk).is_some_and(|p| p.is_empty()) {
            return BestEffort::AlreadyInState;
        }
        BestEffort::from_result(self.run(&format!("{}\nclean", Selection::Disk(disk))))
    }

    /// Brings an offline volume online.
    pub fn online(&self, volume: u32) -> Result<BestEffort> {
        let record = self
            .list_volumes()?
            .into_iter()
            .find(|v| v.index == volume)
            .ok_or_else(|| Error::NotFound(format!("volume {volume}")))?;
        if !record.is_offline() {
            return Ok(BestEffort::AlreadyInState);
        }

        let result = self.run(&format!("{}\nonline volume", Selection::Volume(volume)));
        if result.is_ok() {
            info!(volume, "volume online");
        }
        Ok(BestEffort::from_result(result))
    }

    /// Wipes `disk` and creates a single MBR primary partition formatted as
    /// exFAT. With `confirm`, the user is asked first; declining returns
    /// `Ok(false)` without touching the disk.
    pub fn format(&self, disk: u32, confirm: Option<Confirm<'_>>) -> Result<bool> {
        let entry = self
            .list_disks()?
            .into_iter()
            .find(|d| d.index == disk)
            .ok_or_else(|| Error::NotFound(format!("disk {disk}")))?;

        if let Some(confirm) = confirm {
            if !confirm(&format!("Format disk {} with {}", entry.index, entry.size)) {
                info!(disk, "format declined");
                return Ok(false);
            }
        }

        // A freshly cleaned disk can make diskpart report an error on clean.
        match self.clean(disk) {
            BestEffort::Failed(e) => warn!(disk, "clean failed, continuing: {e}"),
            outcome => debug!(disk, ?outcome, "clean"),
        }

        self.run(&format!(
            "{}\nconvert mbr\ncreate partition primary\nselect partition 1\n\
             format fs=exfat label={FORMAT_LABEL} quick",
            Selection::Disk(disk)
        ))?;
        info!(disk, "formatted as exFAT");
        Ok(true)
    }
}
