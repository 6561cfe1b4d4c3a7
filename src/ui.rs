use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

/// Frames between progress lines when no bar is drawn.
const PLAIN_PROGRESS_EVERY: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    /// Log-only output, regardless of terminal.
    pub fn plain() -> Self {
        Self::new(UiMode::Plain, false)
    }

    pub fn from_args(ui_flag: Option<&str>) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, std::io::stderr().is_terminal())
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && matches!(self.mode, UiMode::Pretty | UiMode::Auto)
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            log::info!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Frame progress for one video. `total` is the advertised frame count.
    pub fn progress(&self, label: &str, total: u64) -> Progress {
        let bar = if self.use_pretty() && total > 0 {
            let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template(
                "{msg} [{bar:40}] {percent:>3}% ({pos}/{len} frames)",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.set_message(label.to_string());
            Some(bar)
        } else {
            None
        };
        Progress {
            total,
            done: 0,
            bar,
        }
    }
}

pub struct Progress {
    total: u64,
    done: u64,
    bar: Option<ProgressBar>,
}

impl Progress {
    pub fn inc(&mut self) {
        self.done += 1;
        match &self.bar {
            Some(bar) => bar.set_position(self.done.min(self.total)),
            None => {
                if self.done % PLAIN_PROGRESS_EVERY == 0 {
                    match percent(self.done, self.total) {
                        Some(pct) => log::info!(
                            "  progress: {:.1}% ({}/{} frames)",
                            pct,
                            self.done,
                            self.total
                        ),
                        None => log::info!("  progress: {} frames", self.done),
                    }
                }
            }
        }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Percentage of `total`, `None` when the total is unknown.
pub fn percent(done: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(done as f64 / total as f64 * 100.0)
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            log::info!("{message}");
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_handles_unknown_totals() {
        assert_eq!(percent(5, 0), None);
        assert_eq!(percent(50, 200), Some(25.0));
    }

    #[test]
    fn plain_progress_counts_frames() {
        let ui = Ui::plain();
        let mut progress = ui.progress("clip", 10);
        for _ in 0..12 {
            progress.inc();
        }
        assert_eq!(progress.done, 12);
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
