mod progress;

use anyhow::{Result, anyhow, bail};
use clap::{ArgAction, Parser, Subcommand};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use progress::Bars;
use sdburn_core::burn::{self, BurnPlan, BurnRequest};
use sdburn_core::platform::SystemHost;
use sdburn_core::volume::Confirm as ConfirmFn;
use sdburn_core::{Config, Diskpart, JoinPolicy, image};
use std::io::{IsTerminal, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use libc::ECHOCTL;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(unix)]
use termios::{TCSANOW, Termios, tcsetattr};

#[derive(Parser)]
#[command(name = "sdburn")]
#[command(about = "Prepare and burn SD cards for Raspberry Pi clusters", version)]
struct Cli {
    /// Path to the disk partitioning utility
    #[arg(long, global = true, env = "SDBURN_DISKPART")]
    diskpart: Option<PathBuf>,

    /// Path to wmic
    #[arg(long, global = true, env = "SDBURN_WMIC")]
    wmic: Option<PathBuf>,

    /// POSIX shell used to read /proc/partitions
    #[arg(long, global = true, env = "SDBURN_SHELL")]
    shell: Option<PathBuf>,

    /// Fail when a disk is missing from one of the device listings
    #[arg(long, global = true)]
    strict: bool,

    /// Show debug output
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List healthy removable volumes
    List,
    /// Show the removable disks reported by the hardware
    Info,
    /// Show the details of a disk
    Detail { disk: u32 },
    /// Wipe a disk and format it as a single exFAT partition
    Format {
        disk: u32,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Burn an image onto the attached SD card
    Burn {
        disk: u32,

        /// Image file to burn (.img, .gz, .xz or .zst)
        image: PathBuf,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Skip write verification
        #[arg(short = 'n', long = "no-verify")]
        no_verify: bool,
    },
    /// Assign a drive letter to a volume
    Mount {
        volume: u32,

        /// Letter to use instead of the first free one
        #[arg(short, long)]
        letter: Option<char>,
    },
    /// Remove the drive letter of a volume
    Unmount { letter: char },
    /// Read a whole device into an image file
    Backup { device: PathBuf, image: PathBuf },
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::default();
        if let Some(path) = &self.diskpart {
            config.diskpart = path.clone();
        }
        if let Some(path) = &self.wmic {
            config.wmic = path.clone();
        }
        if let Some(path) = &self.shell {
            config.shell = path.clone();
        }
        if self.strict {
            config.join = JoinPolicy::Strict;
        }
        config
    }
}

/// Disables `ECHOCTL` on the terminal for the life of the value, so Ctrl+C
/// is not echoed as `^C` over the progress bars.
struct TermRestorer {
    #[cfg(unix)]
    saved: Option<Termios>,
}

impl TermRestorer {
    #[cfg(unix)]
    fn new() -> Self {
        let fd = stdout().as_raw_fd();
        let saved = stdout()
            .is_terminal()
            .then(|| Termios::from_fd(fd).ok())
            .flatten()
            .filter(|original| {
                let mut quiet = *original;
                quiet.c_lflag &= !ECHOCTL;
                tcsetattr(fd, TCSANOW, &quiet).is_ok()
            });
        Self { saved }
    }

    #[cfg(not(unix))]
    fn new() -> Self {
        Self {}
    }
}

impl Drop for TermRestorer {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(saved) = &self.saved {
            tcsetattr(stdout().as_raw_fd(), TCSANOW, saved).ok();
        }
    }
}

fn confirm_operation(prompt: &str) -> Result<bool> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

fn init_tracing(verbose: u8) {
    let default = if verbose > 0 { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn list(diskpart: &Diskpart) -> Result<()> {
    let volumes = diskpart.list_removable()?;
    if volumes.is_empty() {
        println!("No healthy removable volumes found.");
        return Ok(());
    }

    println!("Found {} removable volumes:\n", volumes.len());
    for volume in &volumes {
        println!("  {volume}");
    }
    if volumes.len() > 1 {
        println!(
            "\n{} Remove all cards except the one to burn before burning.",
            style("NOTE:").yellow().bold()
        );
    }
    Ok(())
}

fn info(diskpart: &Diskpart) -> Result<()> {
    let disks = diskpart.removable_disk_info()?;
    if disks.is_empty() {
        println!("No removable disks found.");
    }
    for disk in disks.values() {
        println!("  {disk}");
    }
    Ok(())
}

fn detail(diskpart: &Diskpart, disk: u32) -> Result<()> {
    let detail = diskpart.detail(disk)?;
    if let Some(description) = &detail.description {
        println!("{}", style(description).bold());
    }
    let width = detail.attributes.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in &detail.attributes {
        println!("  {key:<width$} : {value}");
    }
    println!();
    if detail.volumes.is_empty() {
        println!("There are no volumes.");
    }
    for volume in &detail.volumes {
        println!("  {volume}");
    }
    Ok(())
}

fn format(diskpart: &Diskpart, disk: u32, yes: bool) -> Result<()> {
    let ask = |prompt: &str| {
        println!(
            "{} This will erase all data on disk {}.",
            style("WARNING:").red().bold(),
            disk
        );
        confirm_operation(&format!("{prompt}?")).unwrap_or(false)
    };
    let confirm: Option<ConfirmFn> = if yes { None } else { Some(&ask) };

    if diskpart.format(disk, confirm)? {
        println!("✨ Formatted disk {} as exFAT.", style(disk).cyan());
    } else {
        println!("Format cancelled.");
    }
    Ok(())
}

fn burn(
    diskpart: &Diskpart,
    request: BurnRequest,
    yes: bool,
    running: Arc<AtomicBool>,
) -> Result<()> {
    let bars = Bars::new(image::is_compressed(&request.image), request.verify);
    let ask = |plan: &BurnPlan| {
        bars.suspend(|| {
            println!("\n{plan}\n");
            println!(
                "{} This will erase all data on disk {} ({}).",
                style("WARNING:").red().bold(),
                plan.disk,
                plan.size
            );
            let proceed = confirm_operation("Are you sure you want to proceed?").unwrap_or(false);
            println!();
            proceed
        })
    };
    let confirm: Option<&dyn Fn(&BurnPlan) -> bool> = if yes { None } else { Some(&ask) };

    let result = burn::run(diskpart, &request, confirm, running, &mut |event| {
        bars.update(event)
    });

    match result {
        Ok(report) => {
            bars.succeed(if request.verify {
                "Verification successful."
            } else {
                "Write complete (verification skipped)."
            });
            println!(
                "\n✨ Successfully burned {} onto {}.",
                style(request.image.display()).cyan(),
                style(report.plan.device.display()).cyan()
            );
            match report.letter {
                Some(letter) => println!("   The card is mounted at {}", style(format!("{letter}:")).cyan()),
                None => println!("   The card could not be mounted again; try `sdburn mount`."),
            }
            Ok(())
        }
        Err(sdburn_core::Error::Declined(_)) => {
            bars.fail();
            println!("Burn cancelled.");
            Ok(())
        }
        Err(e) => {
            bars.fail();
            Err(e.into())
        }
    }
}

fn backup(device: PathBuf, image: PathBuf, running: Arc<AtomicBool>) -> Result<()> {
    println!("This will read the whole of {}.", style(device.display()).cyan());
    println!("  Output: {}", style(image.display()).cyan());
    println!();

    if !confirm_operation("Are you sure you want to proceed?")? {
        println!("Backup cancelled.");
        return Ok(());
    }
    println!();

    let bars = Bars::new(false, false);
    match sdburn_core::read::run(&device, &image, running, &mut |event| bars.update(event)) {
        Ok(_) => {
            bars.succeed("Read complete.");
            println!(
                "\n✨ Successfully read {} to {}.",
                style(device.display()).cyan(),
                style(image.display()).cyan()
            );
            Ok(())
        }
        Err(e) => {
            bars.fail();
            Err(e.into())
        }
    }
}

fn main() -> Result<()> {
    let _term_restorer = TermRestorer::new();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config();
    debug!(?config, "starting");
    let host = SystemHost::new(config);
    let diskpart = Diskpart::new(&host).with_join_policy(host.config().join);

    match cli.command {
        Commands::List => list(&diskpart),
        Commands::Info => info(&diskpart),
        Commands::Detail { disk } => detail(&diskpart, disk),
        Commands::Format { disk, yes } => format(&diskpart, disk, yes),
        Commands::Burn {
            disk,
            image,
            yes,
            no_verify,
        } => {
            let request = BurnRequest {
                disk,
                image,
                verify: !no_verify,
            };
            burn(&diskpart, request, yes, running)
        }
        Commands::Mount { volume, letter } => {
            let letter = diskpart.assign_drive(volume, letter)?;
            println!("Volume {volume} is mounted at {}", style(format!("{letter}:")).cyan());
            Ok(())
        }
        Commands::Unmount { letter } => {
            if !diskpart.remove_drive(letter) {
                bail!("could not remove drive letter {letter}:");
            }
            println!("Removed drive letter {letter}:");
            Ok(())
        }
        Commands::Backup { device, image } => {
            if !device.exists() {
                return Err(anyhow!("device {} does not exist", device.display()));
            }
            backup(device, image, running)
        }
    }
}
