//! Debounced draft saving.
//!
//! The editing thread hands serialized snapshots to an [`Autosaver`]; a
//! background task waits until no new snapshot has arrived for the
//! configured delay and then stores only the latest one.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::Editor;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("draft store rejected the snapshot: {0}")]
    Rejected(String),
    #[error("draft store unavailable: {0}")]
    Unavailable(String),
}

/// Where drafts go. Implemented by the host, usually over the draft API.
pub trait DraftStore: Send + Sync + 'static {
    fn save_draft(&self, html: String) -> impl Future<Output = Result<(), SaveError>> + Send;
}

pub struct Autosaver {
    tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Autosaver {
    /// Spawns the save task on the current tokio runtime.
    pub fn spawn<S: DraftStore>(store: S, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(store, rx, cancel.clone(), delay));
        Self {
            tx,
            cancel,
            task: Some(task),
        }
    }

    /// Queues a snapshot. Returns `false` once the task has stopped.
    pub fn schedule(&self, html: String) -> bool {
        self.tx.send(html).is_ok()
    }

    /// Queues the save form of the editor's current document.
    pub fn schedule_editor(&self, editor: &Editor) -> bool {
        self.schedule(editor.save_output().html)
    }

    /// Stops the task and waits for it. A pending snapshot is dropped.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            tracing::warn!(target: "ndla_editor::autosave", %err, "autosave task failed");
        }
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<S: DraftStore>(
    store: S,
    mut rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    delay: Duration,
) {
    let mut pending: Option<String> = None;
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if pending.is_some() {
                    tracing::debug!(target: "ndla_editor::autosave", "dropping unsaved snapshot on teardown");
                }
                return;
            }

            msg = rx.recv() => match msg {
                // a newer snapshot restarts the wait
                Some(html) => pending = Some(html),
                None => return,
            },

            _ = tokio::time::sleep(delay), if pending.is_some() => {
                let Some(html) = pending.take() else {
                    continue;
                };
                let bytes = html.len();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = store.save_draft(html) => match result {
                        Ok(()) => tracing::debug!(target: "ndla_editor::autosave", bytes, "draft saved"),
                        Err(err) => tracing::warn!(target: "ndla_editor::autosave", %err, "draft save failed"),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        saved: Arc<Mutex<Vec<String>>>,
    }

    impl DraftStore for Recorder {
        async fn save_draft(&self, html: String) -> Result<(), SaveError> {
            self.saved.lock().unwrap().push(html);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_snapshots_collapse_into_one_save() {
        let store = Recorder::default();
        let saver = Autosaver::spawn(store.clone(), Duration::from_millis(100));
        for n in 0..5 {
            assert!(saver.schedule(format!("<section><p>{n}</p></section>")));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*store.saved.lock().unwrap(), vec!["<section><p>4</p></section>".to_string()]);
        saver.shutdown().await;
    }
}
