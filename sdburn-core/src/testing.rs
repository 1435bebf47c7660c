//! A scripted [`Host`] for unit tests.
//!
//! `FakeHost` keeps a small model of disks and volumes and answers diskpart
//! scripts, `wmic` and `/proc/partitions` queries with text laid out the way
//! the real tools lay it out. Mutating commands (`assign`, `remove`, `clean`,
//! `format`, `online`) update the model, so a test can observe their effect
//! through a later listing.

use crate::error::{Error, Result};
use crate::host::Host;
use crate::write::Progress;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

#[derive(Clone, Debug)]
pub(crate) struct FakeVolume {
    pub index: u32,
    pub letter: Option<char>,
    pub label: String,
    pub fs: String,
    pub kind: String,
    pub size: String,
    pub status: String,
    pub info: String,
}

#[derive(Clone, Debug)]
pub(crate) struct FakeDisk {
    pub index: u32,
    pub status: String,
    pub size: String,
    pub model: String,
    pub interface: String,
    pub media: String,
    pub bytes: u64,
    /// Kernel name in `/proc/partitions`, e.g. "sdb".
    pub device: String,
    pub volumes: Vec<FakeVolume>,
    pub in_disk_listing: bool,
    pub in_drive_listing: bool,
}

pub(crate) fn system_disk() -> FakeDisk {
    FakeDisk {
        index: 0,
        status: "Online".into(),
        size: "476 GB".into(),
        model: "Samsung SSD 970 EVO".into(),
        interface: "SCSI".into(),
        media: "Fixed hard disk media".into(),
        bytes: 512_105_932_800,
        device: "sda".into(),
        volumes: vec![FakeVolume {
            index: 0,
            letter: Some('C'),
            label: "Windows".into(),
            fs: "NTFS".into(),
            kind: "Partition".into(),
            size: "475 GB".into(),
            status: "Healthy".into(),
            info: "Boot".into(),
        }],
        in_disk_listing: true,
        in_drive_listing: true,
    }
}

/// A 64 GB SD card in a USB reader with one FAT32 boot volume.
pub(crate) fn card(disk: u32, volume: u32, letter: Option<char>, device: &str) -> FakeDisk {
    FakeDisk {
        index: disk,
        status: "Online".into(),
        size: "59 GB".into(),
        model: "SDHC Card USB Device".into(),
        interface: "USB".into(),
        media: "Removable Media".into(),
        bytes: 63_864_569_856,
        device: device.into(),
        volumes: vec![FakeVolume {
            index: volume,
            letter,
            label: "boot".into(),
            fs: "FAT32".into(),
            kind: "Removable".into(),
            size: "256 MB".into(),
            status: "Healthy".into(),
            info: String::new(),
        }],
        in_disk_listing: true,
        in_drive_listing: true,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Selected {
    Disk(u32),
    Volume(u32),
}

#[derive(Default)]
pub(crate) struct FakeState {
    pub disks: Vec<FakeDisk>,
    /// Letters in use by something other than a listed volume.
    pub other_letters: Vec<char>,
    pub network_letters: Vec<char>,
    pub automount: bool,
    pub fail_clean: bool,
    /// `detail disk` fails for this disk.
    pub fail_detail: Option<u32>,
    /// `rescan` fails once an image has been written.
    pub fail_rescan_after_write: bool,
    pub fail_write: bool,
    pub scripts: Vec<String>,
    pub writes: Vec<(PathBuf, PathBuf)>,
    selected: Option<Selected>,
}

impl FakeState {
    fn volumes(&self) -> impl Iterator<Item = &FakeVolume> {
        self.disks.iter().flat_map(|d| d.volumes.iter())
    }

    fn volume_mut(&mut self, index: u32) -> Option<&mut FakeVolume> {
        self.disks
            .iter_mut()
            .flat_map(|d| d.volumes.iter_mut())
            .find(|v| v.index == index)
    }

    fn disk(&self, index: u32) -> Option<&FakeDisk> {
        self.disks.iter().find(|d| d.index == index)
    }

    fn letters(&self) -> Vec<char> {
        let mut letters: Vec<char> = self
            .volumes()
            .filter_map(|v| v.letter)
            .chain(self.other_letters.iter().copied())
            .collect();
        letters.sort_unstable();
        letters
    }
}

pub(crate) struct FakeHost {
    pub state: RefCell<FakeState>,
}

fn fail(message: &str) -> Error {
    Error::ExternalTool {
        tool: "diskpart".into(),
        status: "exit code: 1".into(),
        output: message.into(),
    }
}

/// Lays out a fixed-width table the way diskpart does: two leading spaces,
/// two spaces between columns, a dashed separator under the header.
fn render_table(columns: &[(&str, usize)], rows: &[Vec<String>]) -> String {
    let line = |cells: Vec<String>| {
        let body: Vec<String> = cells
            .iter()
            .zip(columns)
            .map(|(cell, &(_, width))| format!("{cell:<width$}"))
            .collect();
        format!("  {}", body.join("  ").trim_end())
    };

    let mut out = vec![
        line(columns.iter().map(|(name, _)| name.to_string()).collect()),
        line(columns.iter().map(|(_, width)| "-".repeat(*width)).collect()),
    ];
    out.extend(rows.iter().map(|row| line(row.clone())));
    out.join("\n")
}

fn volume_table<'a>(volumes: impl Iterator<Item = &'a FakeVolume>) -> String {
    let rows: Vec<Vec<String>> = volumes
        .map(|v| {
            vec![
                format!("Volume {}", v.index),
                v.letter.map(String::from).unwrap_or_default(),
                v.label.clone(),
                v.fs.clone(),
                v.kind.clone(),
                v.size.clone(),
                v.status.clone(),
                v.info.clone(),
            ]
        })
        .collect();
    render_table(
        &[
            ("Volume ###", 10),
            ("Ltr", 3),
            ("Label", 11),
            ("Fs", 5),
            ("Type", 10),
            ("Size", 7),
            ("Status", 9),
            ("Info", 8),
        ],
        &rows,
    )
}

impl FakeHost {
    pub fn new(disks: Vec<FakeDisk>) -> Self {
        Self {
            state: RefCell::new(FakeState {
                disks,
                ..FakeState::default()
            }),
        }
    }

    pub fn letter_of(&self, volume: u32) -> Option<char> {
        self.state
            .borrow()
            .volumes()
            .find(|v| v.index == volume)
            .and_then(|v| v.letter)
    }

    pub fn commands(&self) -> Vec<String> {
        self.state
            .borrow()
            .scripts
            .iter()
            .flat_map(|s| s.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    fn command(&self, state: &mut FakeState, command: &str) -> Result<String> {
        let words: Vec<&str> = command.split_whitespace().collect();
        let number = |i: usize| -> Result<u32> {
            words
                .get(i)
                .and_then(|w| w.parse().ok())
                .ok_or_else(|| fail("The arguments specified for this command are not valid."))
        };
        let letter_arg = || -> Result<char> {
            words
                .get(1)
                .and_then(|w| w.strip_prefix("letter="))
                .and_then(|l| l.chars().next())
                .map(|c| c.to_ascii_uppercase())
                .ok_or_else(|| fail("The arguments specified for this command are not valid."))
        };

        match words.as_slice() {
            ["rescan"] if state.fail_rescan_after_write && !state.writes.is_empty() => Err(
                fail("DiskPart has encountered an error: The device is not ready."),
            ),
            ["rescan"] => Ok("Please wait while DiskPart scans your configuration...\n\n\
                              DiskPart has finished scanning your configuration."
                .into()),
            ["automount", mode] => {
                state.automount = *mode == "enable";
                Ok(format!(
                    "Automatic mounting of new volumes {}.",
                    if state.automount { "enabled" } else { "disabled" }
                ))
            }
            ["list", "disk"] => {
                let rows: Vec<Vec<String>> = state
                    .disks
                    .iter()
                    .filter(|d| d.in_disk_listing)
                    .map(|d| {
                        vec![
                            format!("Disk {}", d.index),
                            d.status.clone(),
                            d.size.clone(),
                            "1024 KB".into(),
                            String::new(),
                            String::new(),
                        ]
                    })
                    .collect();
                Ok(render_table(
                    &[
                        ("Disk ###", 8),
                        ("Status", 13),
                        ("Size", 7),
                        ("Free", 7),
                        ("Dyn", 3),
                        ("Gpt", 3),
                    ],
                    &rows,
                ))
            }
            ["list", "volume"] => Ok(volume_table(state.volumes())),
            ["select", "disk", _] => {
                let index = number(2)?;
                state
                    .disk(index)
                    .ok_or_else(|| fail("The disk you specified is not valid."))?;
                state.selected = Some(Selected::Disk(index));
                Ok(format!("Disk {index} is now the selected disk."))
            }
            ["select", "volume", _] => {
                let index = number(2)?;
                state
                    .volume_mut(index)
                    .ok_or_else(|| fail("The volume you selected is not valid or does not exist."))?;
                state.selected = Some(Selected::Volume(index));
                Ok(format!("Volume {index} is the selected volume."))
            }
            ["select", "partition", n] => Ok(format!("Partition {n} is now the selected partition.")),
            ["list", "partition"] => {
                let Some(Selected::Disk(index)) = state.selected else {
                    return Err(fail("There is no disk selected."));
                };
                let disk = state.disk(index).expect("selected disk exists");
                if disk.volumes.is_empty() {
                    return Ok("There are no partitions on this disk to show.".into());
                }
                let rows: Vec<Vec<String>> = disk
                    .volumes
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        vec![
                            format!("Partition {}", i + 1),
                            "Primary".into(),
                            v.size.clone(),
                            "4096 KB".into(),
                        ]
                    })
                    .collect();
                Ok(render_table(
                    &[
                        ("Partition ###", 13),
                        ("Type", 16),
                        ("Size", 7),
                        ("Offset", 7),
                    ],
                    &rows,
                ))
            }
            ["detail", "disk"] => {
                let Some(Selected::Disk(index)) = state.selected else {
                    return Err(fail("There is no disk selected."));
                };
                if state.fail_detail == Some(index) {
                    return Err(fail("Virtual Disk Service error: The device is not ready."));
                }
                let disk = state.disk(index).expect("selected disk exists");
                let mut out = format!(
                    "{}\nDisk ID: 1A2B3C4{}\nType   : {}\nStatus : {}\nPath   : 0\nTarget : 0\n\
                     LUN ID : 0\nLocation Path : UNAVAILABLE\nCurrent Read-only State : No\n\
                     Read-only  : No\nBoot Disk  : No\nPagefile Disk  : No\n\
                     Hibernation File Disk  : No\nCrashdump Disk  : No\nClustered Disk  : No\n\n",
                    disk.model, disk.index, disk.interface, disk.status
                );
                if disk.volumes.is_empty() {
                    out.push_str("There are no volumes.");
                } else {
                    out.push_str(&volume_table(disk.volumes.iter()));
                }
                Ok(out)
            }
            ["assign", _] => {
                let letter = letter_arg()?;
                let Some(Selected::Volume(index)) = state.selected else {
                    return Err(fail("There is no volume selected."));
                };
                if state.letters().contains(&letter) {
                    return Err(fail("The specified drive letter is not free to be assigned."));
                }
                state.volume_mut(index).expect("selected volume exists").letter = Some(letter);
                Ok("DiskPart successfully assigned the drive letter or mount point.".into())
            }
            ["remove", _] | ["remove", _, "dismount"] => {
                let letter = letter_arg()?;
                let Some(Selected::Volume(index)) = state.selected else {
                    return Err(fail("There is no volume selected."));
                };
                let volume = state.volume_mut(index).expect("selected volume exists");
                if volume.letter != Some(letter) {
                    return Err(fail("The drive letter or mount point is not valid."));
                }
                volume.letter = None;
                Ok("DiskPart successfully removed the drive letter or mount point.".into())
            }
            ["online", "volume"] => {
                let Some(Selected::Volume(index)) = state.selected else {
                    return Err(fail("There is no volume selected."));
                };
                state.volume_mut(index).expect("selected volume exists").info = String::new();
                Ok("DiskPart successfully onlined the selected volume.".into())
            }
            ["clean"] => {
                if state.fail_clean {
                    return Err(fail("DiskPart has encountered an error: Access is denied."));
                }
                let Some(Selected::Disk(index)) = state.selected else {
                    return Err(fail("There is no disk selected."));
                };
                if let Some(disk) = state.disks.iter_mut().find(|d| d.index == index) {
                    disk.volumes.clear();
                }
                Ok("DiskPart succeeded in cleaning the disk.".into())
            }
            ["convert", "mbr"] => Ok("DiskPart successfully converted the selected disk to MBR format.".into()),
            ["create", "partition", "primary"] => {
                Ok("DiskPart succeeded in creating the specified partition.".into())
            }
            ["format", ..] => Ok("  100 percent completed\n\nDiskPart successfully formatted the volume.".into()),
            ["exit"] => Ok("Leaving DiskPart...".into()),
            _ => Err(fail("Microsoft DiskPart: unknown command")),
        }
    }
}

impl Host for FakeHost {
    fn diskpart(&self, script: &str) -> Result<String> {
        let mut state = self.state.borrow_mut();
        state.scripts.push(script.to_string());
        state.selected = None;

        let mut out = String::from(
            "\nMicrosoft DiskPart version 10.0.19041.964\n\n\
             Copyright (C) Microsoft Corporation.\nOn computer: NODE\n",
        );
        for command in script.lines().chain(["exit"]) {
            let reply = self.command(&mut state, command.trim())?;
            out.push('\n');
            out.push_str(&reply);
            out.push('\n');
        }
        Ok(out)
    }

    fn wmic_diskdrive(&self, _fields: &[&str]) -> Result<String> {
        let state = self.state.borrow();
        let line = |cells: [String; 7]| {
            let widths = [5, 13, 21, 20, 10, 12, 6];
            let body: Vec<String> = cells
                .iter()
                .zip(widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect();
            format!("{}  ", body.join("  "))
        };

        let mut lines = vec![line([
            "Index".into(),
            "InterfaceType".into(),
            "MediaType".into(),
            "Model".into(),
            "Partitions".into(),
            "Size".into(),
            "Status".into(),
        ])];
        for disk in state.disks.iter().filter(|d| d.in_drive_listing) {
            lines.push(line([
                disk.index.to_string(),
                disk.interface.clone(),
                disk.media.clone(),
                disk.model.clone(),
                disk.volumes.len().to_string(),
                disk.bytes.to_string(),
                "OK".into(),
            ]));
        }
        lines.push(String::new());
        Ok(lines.join("\r\r\n"))
    }

    fn proc_partitions(&self) -> Result<String> {
        let state = self.state.borrow();
        let mut out = String::from("major minor  #blocks  name   win-mounts\n\n");
        for (d, disk) in state.disks.iter().enumerate() {
            let major = 8;
            let minor = d as u32 * 16;
            out.push_str(&format!(
                "{major:>5} {minor:>5} {:>9} {}\n",
                disk.bytes / 1024,
                disk.device
            ));
            let separator = if disk.device.ends_with(|c: char| c.is_ascii_digit()) {
                "p"
            } else {
                ""
            };
            for (p, volume) in disk.volumes.iter().enumerate() {
                let mount = volume.letter.map(|l| format!("{l}:\\")).unwrap_or_default();
                out.push_str(&format!(
                    "{major:>5} {:>5} {:>9} {}{separator}{}   {mount}\n",
                    minor + p as u32 + 1,
                    262_144,
                    disk.device,
                    p + 1
                ));
            }
        }
        Ok(out)
    }

    fn logical_drives(&self) -> Result<Vec<char>> {
        Ok(self.state.borrow().letters())
    }

    fn remembered_network_drives(&self) -> Result<Vec<char>> {
        Ok(self.state.borrow().network_letters.clone())
    }

    fn raw_device_path(&self, _disk: u32, device_file: &Path) -> PathBuf {
        device_file.to_path_buf()
    }

    fn write_image(
        &self,
        image: &Path,
        device: &Path,
        _verify: bool,
        _running: Arc<AtomicBool>,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<u64> {
        let len = std::fs::metadata(image)?.len();
        let mut state = self.state.borrow_mut();
        state.writes.push((image.to_path_buf(), device.to_path_buf()));
        on_progress(Progress::WriteStarted(len));
        if state.fail_write {
            return Err(Error::IncompleteWrite {
                device: device.to_path_buf(),
                written: len / 2,
                total: len,
                source: Box::new(Error::Io(std::io::ErrorKind::BrokenPipe.into())),
            });
        }
        on_progress(Progress::Written(len));
        Ok(len)
    }
}
