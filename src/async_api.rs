use crate::controller::{MediaOutcome, SequenceController, Selection};
use crate::events::{EventSink, ViewerEvent};
use crate::ledger::LedgerSnapshot;
use crate::media::{MediaFactory, RawMediaEvent, SourceKind, SourceProbe};
use crate::shell::ViewerState;
use crate::{Error, Result, Sequence, ViewerConfig};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use tokio::sync::{broadcast, oneshot};

enum Command {
    Select(usize, oneshot::Sender<Result<Selection>>),
    Complete(usize, oneshot::Sender<Result<bool>>),
    Media(u64, RawMediaEvent, Option<oneshot::Sender<Result<MediaOutcome>>>),
    State(oneshot::Sender<ViewerState>),
    Snapshot(oneshot::Sender<LedgerSnapshot>),
    Switch(Sequence, oneshot::Sender<Result<()>>),
    Close(Option<oneshot::Sender<Result<()>>>),
}

/// An async-friendly viewer session backed by a dedicated worker thread.
///
/// The worker thread owns the `SequenceController` and executes commands
/// sent from async tasks, so UI code can await navigation and feed player
/// events from any task. Events are republished on a broadcast channel.
pub struct Viewer {
    cmd_tx: Sender<Command>,
    events_tx: broadcast::Sender<ViewerEvent>,
}

impl Viewer {
    /// Open a sequence with an empty ledger
    pub async fn open(sequence: Sequence, config: Option<ViewerConfig>) -> Result<Self> {
        Self::spawn(sequence, None, config.unwrap_or_default(), None).await
    }

    /// Open a sequence and restore progress from `snapshot`
    pub async fn resume(sequence: Sequence, snapshot: LedgerSnapshot, config: Option<ViewerConfig>) -> Result<Self> {
        Self::spawn(sequence, Some(snapshot), config.unwrap_or_default(), None).await
    }

    /// Open a sequence, checking every mounted direct stream with `probe`
    pub async fn open_with_probe(
        sequence: Sequence,
        config: Option<ViewerConfig>,
        probe: Arc<dyn SourceProbe>,
    ) -> Result<Self> {
        Self::spawn(sequence, None, config.unwrap_or_default(), Some(probe)).await
    }

    async fn spawn(
        sequence: Sequence,
        snapshot: Option<LedgerSnapshot>,
        config: ViewerConfig,
        probe: Option<Arc<dyn SourceProbe>>,
    ) -> Result<Self> {
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (events_tx, _) = broadcast::channel(config.event_capacity);
        let (init_tx, init_rx): (oneshot::Sender<Result<()>>, oneshot::Receiver<Result<()>>) =
            oneshot::channel();

        let worker_tx = cmd_tx.clone();
        let forward = events_tx.clone();
        thread::spawn(move || {
            let sink = EventSink::new();
            sink.on_event(move |ev| {
                // No receivers is fine
                let _ = forward.send(ev.clone());
            });

            // Initialize on the worker thread
            let probe = match probe.map(Ok).or_else(|| default_probe(&config)) {
                Some(Ok(p)) => Some(p),
                Some(Err(err)) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
                None => None,
            };
            let media = MediaFactory::from_config(&config);
            let mut controller = match snapshot {
                Some(snap) => match SequenceController::resume(sequence, &snap, media, sink) {
                    Ok(c) => c,
                    Err(err) => {
                        let _ = init_tx.send(Err(err));
                        return;
                    }
                },
                None => SequenceController::new(sequence, media, sink),
            };

            let _ = init_tx.send(Ok(()));

            // Command loop
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Select(index, resp) => {
                        let res = controller.select_step(index);
                        if let (Ok(Selection::Mounted { token }), Some(probe)) = (&res, &probe) {
                            if let Some(SourceKind::DirectStream { url }) = controller.active_kind() {
                                spawn_probe(probe.clone(), url.clone(), *token, worker_tx.clone());
                            }
                        }
                        let _ = resp.send(res);
                    }
                    Command::Complete(index, resp) => {
                        let _ = resp.send(controller.mark_completed(index));
                    }
                    Command::Media(token, event, resp) => {
                        let res = controller.handle_media_event(token, event);
                        match resp {
                            Some(resp) => {
                                let _ = resp.send(res);
                            }
                            None => {
                                if let Err(e) = res {
                                    log::warn!("media event for token {} failed: {}", token, e);
                                }
                            }
                        }
                    }
                    Command::State(resp) => {
                        let _ = resp.send(ViewerState::capture(&controller));
                    }
                    Command::Snapshot(resp) => {
                        let _ = resp.send(controller.snapshot());
                    }
                    Command::Switch(sequence, resp) => {
                        controller.switch_sequence(sequence);
                        let _ = resp.send(Ok(()));
                    }
                    Command::Close(resp) => {
                        controller.close();
                        if let Some(resp) = resp {
                            let _ = resp.send(Ok(()));
                        }
                        break;
                    }
                }
            }
        });

        // Wait for the worker to report initialization success or failure
        let init_res = init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))?;
        init_res?;

        Ok(Self { cmd_tx, events_tx })
    }

    /// Subscribe to all future viewer events.
    ///
    /// Slow subscribers receive `RecvError::Lagged(n)` instead of blocking the worker.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewerEvent> {
        self.events_tx.subscribe()
    }

    pub async fn select_step(&self, index: usize) -> Result<Selection> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Select(index, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Select canceled: {}", e)))?
    }

    /// Explicit "mark as complete" override
    pub async fn mark_completed(&self, index: usize) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Complete(index, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Complete canceled: {}", e)))?
    }

    /// Forward a player event for the media mounted under `token`
    pub async fn media_event(&self, token: u64, event: RawMediaEvent) -> Result<MediaOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Media(token, event, Some(tx)))?;
        rx.await
            .map_err(|e| Error::Other(format!("Media event canceled: {}", e)))?
    }

    pub async fn state(&self) -> Result<ViewerState> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::State(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("State canceled: {}", e)))
    }

    pub async fn snapshot(&self) -> Result<LedgerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Snapshot canceled: {}", e)))
    }

    /// Drop the current session and start `sequence` with an empty ledger
    pub async fn switch_sequence(&self, sequence: Sequence) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Switch(sequence, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Switch canceled: {}", e)))?
    }

    /// Release media and stop the worker
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Close(Some(tx)))?;
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::Other("viewer worker has stopped".to_string()))
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        // The worker holds a sender for probe feedback, so it must be told to stop.
        let _ = self.cmd_tx.send(Command::Close(None));
    }
}

#[cfg(feature = "http")]
fn default_probe(config: &ViewerConfig) -> Option<Result<Arc<dyn SourceProbe>>> {
    if !config.probe_direct_sources {
        return None;
    }
    Some(crate::media::HttpProbe::new(config).map(|p| Arc::new(p) as Arc<dyn SourceProbe>))
}

#[cfg(not(feature = "http"))]
fn default_probe(config: &ViewerConfig) -> Option<Result<Arc<dyn SourceProbe>>> {
    if config.probe_direct_sources {
        log::warn!("probe_direct_sources is set but the `http` feature is disabled");
    }
    None
}

fn spawn_probe(probe: Arc<dyn SourceProbe>, url: url::Url, token: u64, tx: Sender<Command>) {
    thread::spawn(move || {
        if let Err(err) = probe.probe(&url) {
            log::warn!("probe of {} failed: {}", url, err);
            let _ = tx.send(Command::Media(token, RawMediaEvent::TransportError(err.to_string()), None));
        }
    });
}
