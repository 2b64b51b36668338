//! Progress reporting
//!
//! Thin wrapper over indicatif. Strictly fire-and-forget: nothing here is
//! on a correctness path, and updates may be dropped under contention.

use indicatif::{ProgressBar, ProgressStyle};

pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    /// Start a labelled bar; the length is learned from the first update.
    pub fn start(label: &str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:32}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(label.to_string());
        Self { bar }
    }

    pub fn update(&self, current: usize, max: usize) {
        self.bar.set_length(max as u64);
        self.bar.set_position(current as u64);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
