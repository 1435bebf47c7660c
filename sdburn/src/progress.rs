use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use sdburn_core::Progress;
use std::time::Duration;

fn bar_style(color: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(&format!(
            "{{prefix:12}} [{{elapsed_precise}}] [{{bar:40.{color}/black}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}})"
        ))
        .expect("progress bar template is valid")
        .progress_chars("■ ")
}

fn spinner_style() -> ProgressStyle {
    let frames: Vec<String> = (0..8)
        .map(|i| {
            let mut frame = " ".repeat(8);
            frame.replace_range(i..=i, "■");
            style(frame).blue().to_string()
        })
        .collect();
    let frames: Vec<&str> = frames.iter().map(String::as_str).collect();

    ProgressStyle::default_spinner()
        .template("{prefix:12} [{elapsed_precise}] [{spinner}] {bytes} ({bytes_per_sec}) {msg}")
        .expect("spinner template is valid")
        .tick_strings(&frames)
}

/// Terminal rendering of the [`Progress`] events of one operation.
///
/// Bars for stages that will not run are hidden up front so they never
/// flash on screen.
pub struct Bars {
    decompress: ProgressBar,
    transfer: ProgressBar,
    verify: ProgressBar,
}

impl Bars {
    pub fn new(decompress: bool, verify: bool) -> Self {
        Self {
            decompress: if decompress {
                ProgressBar::new_spinner()
            } else {
                ProgressBar::hidden()
            },
            transfer: ProgressBar::new(0),
            verify: if verify {
                ProgressBar::new(0)
            } else {
                ProgressBar::hidden()
            },
        }
    }

    fn start(bar: &ProgressBar, prefix: &'static str, color: &str, len: u64) {
        bar.set_length(len);
        bar.set_prefix(prefix);
        bar.set_style(bar_style(color));
    }

    pub fn update(&self, event: Progress) {
        match event {
            Progress::DecompressStarted => {
                self.decompress.set_prefix("Decompress");
                self.decompress.set_style(spinner_style());
                self.decompress.enable_steady_tick(Duration::from_millis(100));
            }
            Progress::Decompressed(bytes) => self.decompress.set_position(bytes),
            Progress::WriteStarted(len) => {
                self.finish_decompress();
                Self::start(&self.transfer, "Writing", "green", len);
            }
            Progress::ReadStarted(len) => Self::start(&self.transfer, "Reading", "green", len),
            Progress::Written(bytes) | Progress::Read(bytes) => self.transfer.set_position(bytes),
            Progress::VerifyStarted(len) => {
                self.transfer.finish_with_message("Write complete.");
                Self::start(&self.verify, "Verifying", "magenta", len);
            }
            Progress::Verified(bytes) => self.verify.set_position(bytes),
        }
    }

    fn finish_decompress(&self) {
        if !self.decompress.is_finished() {
            self.decompress.finish_with_message("Decompression complete.");
        }
    }

    /// Runs `f` with the bars off the terminal, for prompts shown between
    /// stages. A ticking decompression spinner is stopped for good.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.finish_decompress();
        self.decompress.suspend(f)
    }

    pub fn succeed(&self, message: &'static str) {
        if self.verify.is_hidden() {
            self.transfer.finish_with_message(message);
        } else {
            self.verify.finish_with_message(message);
        }
    }

    pub fn fail(&self) {
        if !self.decompress.is_finished() {
            self.decompress.finish_with_message("❌ Operation failed.");
        }
        self.transfer.finish_and_clear();
        self.verify.finish_and_clear();
    }
}
