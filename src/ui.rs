//! Terminal progress output for the daemon.
//!
//! Long setup steps (model load, camera acquisition) get a spinner on a TTY
//! and plain stage lines when piped. Runtime status goes through `log`, not
//! here.

use std::io::{stderr, IsTerminal};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

#[derive(Clone, Copy, Debug, Default)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(flag: Option<&str>) -> Self {
        match flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode) -> Self {
        let pretty = match mode {
            UiMode::Pretty => true,
            UiMode::Plain => false,
            UiMode::Auto => stderr().is_terminal(),
        };
        Self { pretty }
    }

    /// Announce a setup stage. The guard reports duration when it completes.
    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    finished: bool,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            finished: false,
        }
    }

    /// Mark the stage failed. The guard stops reporting success on drop.
    pub fn fail(mut self, reason: &str) {
        let message = format!("✘ {}: {}", self.name, reason);
        if let Some(spinner) = self.spinner.take() {
            spinner.abandon_with_message(message);
        } else {
            eprintln!("{message}");
        }
        self.finished = true;
    }

    fn finish(&mut self) {
        let message = format!(
            "✔ {} ({})",
            self.name,
            format_duration(self.start.elapsed())
        );
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
        self.finished = true;
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.finish();
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
