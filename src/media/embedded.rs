//! Embedded provider playback.
//!
//! The provider's player API is bootstrapped once and shared by every
//! mount afterwards. Completion is driven by the provider's state-change
//! event filtered to its "ended" value.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{MediaAdapter, MediaHandle, MediaSignal, RawMediaEvent, SourceKind};
use crate::{Error, Result};

const STATE_UNSTARTED: i32 = -1;
const STATE_ENDED: i32 = 0;
const STATE_PLAYING: i32 = 1;
const STATE_PAUSED: i32 = 2;
const STATE_BUFFERING: i32 = 3;
const STATE_CUED: i32 = 5;

/// Identifier of a player instance created by the provider runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(u64);

/// The loaded provider player API
#[derive(Debug)]
pub struct ProviderRuntime {
    api_url: String,
    next_player: AtomicU64,
    live_players: AtomicUsize,
}

impl ProviderRuntime {
    pub fn new(api_url: impl Into<String>) -> Self {
        ProviderRuntime {
            api_url: api_url.into(),
            next_player: AtomicU64::new(1),
            live_players: AtomicUsize::new(0),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn create_player(&self, video_id: &str) -> PlayerId {
        let id = PlayerId(self.next_player.fetch_add(1, Ordering::Relaxed));
        self.live_players.fetch_add(1, Ordering::Relaxed);
        log::debug!("provider player {:?} created for video '{}'", id, video_id);
        id
    }

    pub fn destroy_player(&self, id: PlayerId) {
        self.live_players.fetch_sub(1, Ordering::Relaxed);
        log::debug!("provider player {:?} destroyed", id);
    }

    /// Players created and not yet destroyed
    pub fn live_players(&self) -> usize {
        self.live_players.load(Ordering::Relaxed)
    }
}

type BootstrapFn = Arc<dyn Fn(&str) -> Result<ProviderRuntime> + Send + Sync>;

/// Lazily bootstraps the provider runtime exactly once.
///
/// Clones share the same slot. A failed bootstrap is not memoized; the
/// next mount tries again.
#[derive(Clone)]
pub struct ProviderLoader {
    api_url: String,
    slot: Arc<Mutex<Option<Arc<ProviderRuntime>>>>,
    bootstrap: BootstrapFn,
    bootstraps: Arc<AtomicUsize>,
}

impl ProviderLoader {
    /// Loader whose bootstrap just records the API location; the host page
    /// is responsible for the script itself.
    pub fn new(api_url: impl Into<String>) -> Self {
        ProviderLoader::with_bootstrap(api_url, |url| Ok(ProviderRuntime::new(url)))
    }

    pub fn with_bootstrap<F>(api_url: impl Into<String>, bootstrap: F) -> Self
    where
        F: Fn(&str) -> Result<ProviderRuntime> + Send + Sync + 'static,
    {
        ProviderLoader {
            api_url: api_url.into(),
            slot: Arc::new(Mutex::new(None)),
            bootstrap: Arc::new(bootstrap),
            bootstraps: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared runtime, bootstrapping it on first use
    pub fn runtime(&self) -> Result<Arc<ProviderRuntime>> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| Error::Other("provider runtime lock poisoned".to_string()))?;
        if let Some(rt) = slot.as_ref() {
            return Ok(rt.clone());
        }
        self.bootstraps.fetch_add(1, Ordering::Relaxed);
        log::info!("bootstrapping embedded provider API from {}", self.api_url);
        let rt = Arc::new((self.bootstrap)(&self.api_url)?);
        *slot = Some(rt.clone());
        Ok(rt)
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Number of bootstrap attempts so far
    pub fn bootstrap_count(&self) -> usize {
        self.bootstraps.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ProviderLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderLoader")
            .field("api_url", &self.api_url)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Adapter for embedded provider videos
pub struct EmbeddedProviderAdapter {
    kind: SourceKind,
    video_id: String,
    loader: ProviderLoader,
    player: Option<(Arc<ProviderRuntime>, PlayerId)>,
}

impl EmbeddedProviderAdapter {
    pub fn new(video_id: String, loader: ProviderLoader) -> Self {
        EmbeddedProviderAdapter {
            kind: SourceKind::EmbeddedProvider {
                video_id: video_id.clone(),
            },
            video_id,
            loader,
            player: None,
        }
    }

    pub fn player(&self) -> Option<PlayerId> {
        self.player.as_ref().map(|(_, id)| *id)
    }
}

fn provider_error_message(code: i32) -> String {
    let what = match code {
        2 => "invalid video parameter",
        5 => "provider player error",
        100 => "video not found or private",
        101 | 150 => "embedding not allowed by owner",
        _ => "unknown provider error",
    };
    format!("{} (code {})", what, code)
}

impl MediaAdapter for EmbeddedProviderAdapter {
    fn kind(&self) -> &SourceKind {
        &self.kind
    }

    fn mount(&mut self, handle: &MediaHandle) -> Result<()> {
        self.unmount();
        let runtime = self.loader.runtime()?;
        let player = runtime.create_player(&self.video_id);
        log::debug!(
            "mounted provider video '{}' for step {} (token {})",
            self.video_id,
            handle.step_index(),
            handle.token()
        );
        self.player = Some((runtime, player));
        Ok(())
    }

    fn interpret(&mut self, event: &RawMediaEvent) -> Option<MediaSignal> {
        match event {
            RawMediaEvent::ProviderState(code) => match *code {
                STATE_UNSTARTED | STATE_CUED => Some(MediaSignal::Ready),
                STATE_BUFFERING => Some(MediaSignal::Buffering),
                STATE_PLAYING => Some(MediaSignal::Playing),
                STATE_PAUSED => Some(MediaSignal::Paused),
                STATE_ENDED => Some(MediaSignal::Ended { natural: true }),
                other => {
                    log::debug!("ignoring provider state {}", other);
                    None
                }
            },
            RawMediaEvent::ProviderError(code) => Some(MediaSignal::Failed(provider_error_message(*code))),
            RawMediaEvent::TransportError(msg) => Some(MediaSignal::Failed(msg.clone())),
            RawMediaEvent::Element(ev) => {
                log::warn!("element event {:?} sent to an embedded provider player; ignored", ev);
                None
            }
        }
    }

    fn unmount(&mut self) {
        if let Some((runtime, player)) = self.player.take() {
            runtime.destroy_player(player);
        }
    }
}

impl Drop for EmbeddedProviderAdapter {
    fn drop(&mut self) {
        self.unmount();
    }
}
