//! Terminal progress bars for the pool stages.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};

const TEMPLATE: &str = "{prefix:>10} {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}<{eta_precise}] {msg}";

/// Owner of every progress bar shown during a run.
///
/// Closing the board abandons all bars so the terminal is left clean when a
/// run is interrupted.
pub struct ProgressBoard {
    multi: MultiProgress,
    bars: Mutex<Vec<ProgressBar>>,
    closed: AtomicBool,
}

impl ProgressBoard {
    /// Draw to stderr, or nowhere when stderr is not a terminal.
    pub fn new() -> Self {
        if std::io::stderr().is_terminal() {
            Self::with_target(ProgressDrawTarget::stderr())
        } else {
            Self::hidden()
        }
    }

    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Add a bar for one stage of `len` jobs.
    pub fn stage(&self, label: &str, len: u64) -> ProgressBar {
        if self.is_closed() {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        let bar = self.multi.add(ProgressBar::new(len));
        bar.set_style(style);
        bar.set_prefix(label.to_string());
        self.bars.lock().push(bar.clone());
        bar
    }

    /// Abandon every bar. Later calls are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for bar in self.bars.lock().drain(..) {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
        let _ = self.multi.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}
