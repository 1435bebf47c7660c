//! The core, UI-agnostic library for the `sdburn` SD-card preparation tool.
//!
//! `sdburn-core` drives the Windows disk utilities (`diskpart`, `wmic`) and the
//! `/proc/partitions` view of a POSIX compatibility layer to find the one
//! removable card attached to the machine, manage its volumes and burn a
//! Raspberry Pi image onto it.
//!
//! The library is structured into several key modules:
//! - [`table`]: Parses the fixed-width tables the disk utilities print.
//! - [`registry`]: Read-only queries over disks, volumes, partitions and drives,
//!   through the [`Diskpart`] entry point.
//! - [`volume`]: Mounting, unmounting, cleaning, formatting and onlining.
//! - [`removable`]: Narrows everything down to healthy removable volumes.
//! - [`burn`]: The burn itself, refusing anything but a single unambiguous card.
//! - [`platform`]: The [`Host`] implementation that runs the real tools.
//! - [`mod@read`] and [`mod@write`]: Raw block copies between images and devices.
//!
//! Long-running operations report their progress through a
//! `&mut dyn FnMut(Progress)` callback and stop when a shared `AtomicBool`
//! is cleared, so any front-end can render progress and handle cancellation
//! its own way.
//!
//! ## Example: Burning the Attached Card
//!
//! ```rust,no_run
//! use sdburn_core::burn::{self, BurnRequest};
//! use sdburn_core::{Config, Diskpart, Progress, platform::SystemHost};
//! use std::sync::{Arc, atomic::AtomicBool};
//!
//! fn main() -> sdburn_core::Result<()> {
//!     let host = SystemHost::new(Config::default());
//!     let diskpart = Diskpart::new(&host);
//!
//!     for volume in diskpart.list_removable()? {
//!         println!("{volume}");
//!     }
//!
//!     let request = BurnRequest {
//!         disk: 1,
//!         image: "raspios-lite.img.xz".into(),
//!         verify: true,
//!     };
//!     let running = Arc::new(AtomicBool::new(true));
//!     let report = burn::run(&diskpart, &request, None, running, &mut |event| {
//!         if let Progress::Written(bytes) = event {
//!             println!("{bytes} bytes written");
//!         }
//!     })?;
//!
//!     println!("Burned {} bytes onto {}", report.written, report.plan.device.display());
//!     Ok(())
//! }
//! ```

pub mod burn;
pub mod config;
pub mod device;
mod error;
pub mod host;
pub mod image;
mod os_options;
pub mod platform;
pub mod read;
pub mod registry;
pub mod removable;
pub mod table;
#[cfg(test)]
mod testing;
pub mod volume;
pub mod write;

pub use config::{Config, JoinPolicy};
pub use error::{Error, Result};
pub use host::Host;
pub use registry::Diskpart;
pub use write::Progress;
