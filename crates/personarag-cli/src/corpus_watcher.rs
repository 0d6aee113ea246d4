//! Docstore change watcher.
//!
//! Watches the JSONL docstore and invokes a callback after a debounce
//! window, so the lexical index can be rebuilt and swapped while queries
//! keep being served from the old one.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use personarag_core::{PersonaError, PersonaResult};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

/// Whether a file-system event should trigger a rebuild.
fn is_rebuild_trigger(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

/// Keeps a file-system watch on the docstore alive.
///
/// Dropping it stops the background thread and releases the watch.
pub struct CorpusWatcher {
    _watcher: RecommendedWatcher,
}

impl CorpusWatcher {
    /// Start watching `docstore`.
    ///
    /// `on_change` runs on a background thread at most once per
    /// `debounce_ms`, however many writes land in between.
    pub fn start<F>(docstore: PathBuf, debounce_ms: u64, on_change: F) -> PersonaResult<Self>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let (tx, rx) = std_mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if is_rebuild_trigger(&event.kind) {
                    let _ = tx.send(());
                }
            }
        })
        .map_err(|e| PersonaError::Config(format!("Failed to create file watcher: {e}")))?;

        watcher
            .watch(docstore.as_ref(), RecursiveMode::NonRecursive)
            .map_err(|e| {
                PersonaError::Config(format!(
                    "Failed to watch docstore '{}': {e}",
                    docstore.display()
                ))
            })?;

        let path = docstore.clone();
        std::thread::spawn(move || {
            let debounce = Duration::from_millis(debounce_ms);
            let mut last_change = Instant::now();

            while rx.recv().is_ok() {
                // Let the writer finish, then collapse the burst into one rebuild.
                let since = last_change.elapsed();
                if since < debounce {
                    std::thread::sleep(debounce - since);
                }
                while rx.try_recv().is_ok() {}

                last_change = Instant::now();
                on_change(path.clone());
            }

            tracing::debug!("Corpus watcher thread exiting");
        });

        tracing::info!(path = %docstore.display(), debounce_ms, "Docstore watcher started");

        Ok(Self { _watcher: watcher })
    }
}
