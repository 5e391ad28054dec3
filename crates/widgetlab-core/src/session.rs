//! Debounced, latest-wins recompilation for an editing session.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::compile::{instantiate, transform_widget, CompileOptions, WidgetSource};
use crate::digest::SourceDigest;
use crate::render::{RenderSupervisor, ViewerView};
use crate::sequencer::RequestSequencer;

/// Delay between the last edit and the compile it triggers.
pub const COMPILE_DEBOUNCE: Duration = Duration::from_millis(400);

/// A published viewer state together with the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub token: u64,
    pub digest: SourceDigest,
    pub view: ViewerView,
}

/// Accepts source edits and publishes the viewer state of the newest one.
///
/// Each [`submit`](Self::submit) waits out the debounce, then transforms on the async
/// runtime and evaluates + renders on a blocking thread. Results from superseded
/// submissions are discarded at every step.
pub struct PlaygroundSession {
    options: Arc<CompileOptions>,
    sequencer: Arc<RequestSequencer>,
    supervisor: Arc<Mutex<RenderSupervisor>>,
    debounce: Duration,
    tx: watch::Sender<Option<ViewSnapshot>>,
}

impl PlaygroundSession {
    pub fn new(options: CompileOptions) -> Self {
        Self::with_debounce(options, COMPILE_DEBOUNCE)
    }

    pub fn with_debounce(options: CompileOptions, debounce: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            options: Arc::new(options),
            sequencer: Arc::new(RequestSequencer::new()),
            supervisor: Arc::new(Mutex::new(RenderSupervisor::new())),
            debounce,
            tx,
        }
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<ViewSnapshot>> {
        self.tx.subscribe()
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Option<ViewSnapshot> {
        self.tx.borrow().clone()
    }

    /// Queue `source` for compilation and return its request token.
    pub fn submit(&self, source: WidgetSource) -> u64 {
        let token = self.sequencer.issue();
        let options = Arc::clone(&self.options);
        let sequencer = Arc::clone(&self.sequencer);
        let supervisor = Arc::clone(&self.supervisor);
        let tx = self.tx.clone();
        let debounce = self.debounce;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if !sequencer.is_latest(token) {
                debug!(token, "widget edit superseded before compile");
                return;
            }

            let digest = source.digest();
            let transformed = transform_widget(&source, &options).await;
            if !sequencer.is_latest(token) {
                debug!(token, "widget edit superseded after transform");
                return;
            }

            let render_options = Arc::clone(&options);
            let view = tokio::task::spawn_blocking(move || {
                let mut supervisor = supervisor.lock().unwrap_or_else(|p| p.into_inner());
                match transformed {
                    Ok(transformed) => match instantiate(&transformed, &render_options) {
                        Ok(mut widget) => supervisor.view(Ok(&mut widget)),
                        Err(err) => supervisor.view(Err(&err)),
                    },
                    Err(err) => supervisor.view(Err(&err)),
                }
            })
            .await;

            let view = match view {
                Ok(view) => view,
                Err(err) => {
                    warn!(token, error = %err, "render task failed");
                    return;
                }
            };

            if sequencer.is_latest(token) {
                debug!(token, state = view.label(), "publishing widget view");
                tx.send_replace(Some(ViewSnapshot {
                    token,
                    digest,
                    view,
                }));
            }
        });

        token
    }
}
