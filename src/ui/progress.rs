use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::orchestrator::RunStore;
use crate::review::participants::list_statuses;
use crate::store::FsStore;
use crate::ui::icons::{CHECK, CROSS};

/// How often the reporter re-reads participant status artifacts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Owns the spinner and clears it exactly once, on `finish` or on drop.
pub struct TerminalGuard {
    bar: ProgressBar,
    finished: AtomicBool,
}

impl TerminalGuard {
    pub fn new(bar: ProgressBar) -> Self {
        Self {
            bar,
            finished: AtomicBool::new(false),
        }
    }

    /// Stop the spinner and leave `message` behind. Later calls are no-ops.
    pub fn finish(&self, message: Option<String>) -> bool {
        if self.finished.swap(true, Ordering::SeqCst) {
            return false;
        }
        match message {
            Some(msg) => self.bar.finish_with_message(msg),
            None => self.bar.finish_and_clear(),
        }
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        self.finish(None);
    }
}

/// Live status line for a running step.
///
/// A tokio interval task polls the status artifacts of the current run and
/// redraws an `indicatif` spinner. It only reads; the step's outcome never
/// depends on it.
pub struct StatusReporter {
    guard: Arc<TerminalGuard>,
    task: JoinHandle<()>,
}

impl StatusReporter {
    pub fn spawn(state_dir: PathBuf, step: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(spinner) = ProgressStyle::default_spinner().template("{spinner} {prefix:.bold} {msg}") {
            bar.set_style(spinner);
        }
        bar.set_prefix(step.to_string());
        bar.set_message("starting");
        let guard = Arc::new(TerminalGuard::new(bar.clone()));

        let task = tokio::spawn(async move {
            let store = FsStore::new(state_dir);
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                bar.set_message(summarize(&store));
                bar.tick();
            }
        });
        Self { guard, task }
    }

    pub fn finish(self, ok: bool) {
        self.task.abort();
        let mark = if ok { CHECK } else { CROSS };
        let message = format!("{}{}", mark, style(if ok { "done" } else { "failed" }).dim());
        self.guard.finish(Some(message));
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        self.task.abort();
        self.guard.finish(None);
    }
}

/// One-line participant tally, e.g. `feature-x-1a2b3c4d: 2 DONE, 3 PENDING`.
pub fn summarize(store: &FsStore) -> String {
    let runs = RunStore::new(store);
    let id = match runs.current_id() {
        Ok(Some(id)) => id,
        Ok(None) => return "no current run".to_string(),
        Err(_) => return "waiting for state".to_string(),
    };
    let statuses = match list_statuses(store, &id) {
        Ok(statuses) => statuses,
        Err(_) => return format!("{}: waiting for state", id),
    };
    if statuses.is_empty() {
        return format!("{}: no participants yet", id);
    }
    let mut tally: BTreeMap<String, usize> = BTreeMap::new();
    for (_, record) in &statuses {
        *tally.entry(record.label()).or_default() += 1;
    }
    let parts: Vec<String> = tally.iter().map(|(label, n)| format!("{} {}", n, label)).collect();
    format!("{}: {}", style(id).cyan(), parts.join(", "))
}
