//! Media adapters: classify a step's source, mount it, and turn raw player
//! events into one normalized completion signal.
//!
//! Two playback strategies exist. Embedded-provider sources are driven by
//! the provider's own player state changes; direct streams by the native
//! media element events. Only a natural end of media counts as completion.

pub mod direct;
pub mod embedded;
pub mod probe;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::sequence::{Step, StepId};
use crate::{Error, Result};

pub use direct::DirectStreamAdapter;
pub use embedded::{EmbeddedProviderAdapter, PlayerId, ProviderLoader, ProviderRuntime};
#[cfg(feature = "http")]
pub use probe::HttpProbe;
pub use probe::SourceProbe;

/// Playback strategy selected for a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Video hosted by an embeddable provider
    EmbeddedProvider { video_id: String },
    /// Media file served directly over HTTP(S)
    DirectStream { url: Url },
    /// No adapter can play this source
    Unsupported { reason: String },
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::EmbeddedProvider { .. } => "embedded",
            SourceKind::DirectStream { .. } => "direct",
            SourceKind::Unsupported { .. } => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, SourceKind::Unsupported { .. })
    }
}

/// Host and extension patterns used by [`classify`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceRules {
    /// Hosts whose URLs are played through the embedded provider
    pub embedded_hosts: Vec<String>,
    /// File extensions (lowercase, no dot) played as direct streams
    pub direct_extensions: Vec<String>,
}

impl Default for SourceRules {
    fn default() -> Self {
        Self {
            embedded_hosts: ["youtube.com", "www.youtube.com", "m.youtube.com", "youtu.be", "www.youtube-nocookie.com"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            direct_extensions: ["mp4", "webm", "ogg", "ogv", "m4v", "mov", "mp3", "m4a", "wav", "m3u8"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Classify a source locator. Pure string inspection; never touches the network.
pub fn classify(source_ref: &str, rules: &SourceRules) -> SourceKind {
    let parsed = match Url::parse(source_ref.trim()) {
        Ok(u) => u,
        Err(e) => {
            return SourceKind::Unsupported {
                reason: format!("invalid URL: {}", e),
            }
        }
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return SourceKind::Unsupported {
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        };
    }

    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    if rules.embedded_hosts.iter().any(|h| h.eq_ignore_ascii_case(&host)) {
        return match embedded_video_id(&parsed, &host) {
            Some(video_id) => SourceKind::EmbeddedProvider { video_id },
            None => SourceKind::Unsupported {
                reason: format!("no video id in provider URL '{}'", parsed),
            },
        };
    }

    let ext = parsed
        .path_segments()
        .and_then(|mut segs| segs.next_back())
        .and_then(|last| last.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext {
        Some(ext) if rules.direct_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) => {
            SourceKind::DirectStream { url: parsed }
        }
        Some(ext) => SourceKind::Unsupported {
            reason: format!("unsupported file type '.{}'", ext),
        },
        None => SourceKind::Unsupported {
            reason: "no recognizable media file or provider".to_string(),
        },
    }
}

// Accepts watch?v=, /embed/<id>, /shorts/<id>, /live/<id> and short-host /<id>.
fn embedded_video_id(url: &Url, host: &str) -> Option<String> {
    let mut segs = url.path_segments()?.filter(|s| !s.is_empty());
    let candidate = if host == "youtu.be" {
        segs.next().map(str::to_string)
    } else {
        match segs.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            Some("embed") | Some("shorts") | Some("live") | Some("v") => segs.next().map(str::to_string),
            _ => None,
        }
    };
    candidate.filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
}

/// Playback state of the mounted media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaState {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Errored,
}

impl MediaState {
    /// Whether the step is on screen with live media (not idle, not failed)
    pub fn is_active(self) -> bool {
        matches!(self, MediaState::Loading | MediaState::Playing | MediaState::Paused | MediaState::Ended)
    }
}

/// Native media element events forwarded by the host
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    Loaded,
    Play,
    Playing,
    Pause,
    Waiting,
    /// Seek finished at `position` of `duration` seconds
    Seeked { position: f64, duration: f64 },
    Ended,
    Error(String),
}

/// Raw event delivered by the host for the mounted media
#[derive(Debug, Clone, PartialEq)]
pub enum RawMediaEvent {
    /// Embedded provider state change code
    /// (-1 unstarted, 0 ended, 1 playing, 2 paused, 3 buffering, 5 cued)
    ProviderState(i32),
    /// Embedded provider error code
    ProviderError(i32),
    /// Direct stream element event
    Element(ElementEvent),
    /// Loading failed below the player (network, decode)
    TransportError(String),
}

/// Normalized signal produced by an adapter
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSignal {
    Ready,
    Buffering,
    Playing,
    Paused,
    /// End of media; only `natural` ends complete a step
    Ended { natural: bool },
    Failed(String),
}

impl MediaSignal {
    pub fn state(&self) -> MediaState {
        match self {
            MediaSignal::Ready | MediaSignal::Buffering => MediaState::Loading,
            MediaSignal::Paused => MediaState::Paused,
            MediaSignal::Playing => MediaState::Playing,
            MediaSignal::Ended { .. } => MediaState::Ended,
            MediaSignal::Failed(_) => MediaState::Errored,
        }
    }
}

/// Mounted media, tagged with the step it was mounted for.
///
/// The token is unique per mount; events carrying another token belong to
/// media that has since been replaced and are discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaHandle {
    token: u64,
    step_index: usize,
    step_id: StepId,
    pub(crate) state: MediaState,
    pub(crate) ended: bool,
    // set once the mount fails; later signals are ignored
    pub(crate) failed: bool,
}

impl MediaHandle {
    pub(crate) fn new(token: u64, step: &Step) -> Self {
        MediaHandle {
            token,
            step_index: step.order_index,
            step_id: step.id.clone(),
            state: MediaState::Loading,
            ended: false,
            failed: false,
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn step_id(&self) -> &StepId {
        &self.step_id
    }

    pub fn state(&self) -> MediaState {
        self.state
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }
}

/// A playback strategy for one mounted step
pub trait MediaAdapter: Send {
    fn kind(&self) -> &SourceKind;

    /// Begin loading media for `handle`
    fn mount(&mut self, handle: &MediaHandle) -> Result<()>;

    /// Translate a raw event into a normalized signal; `None` when the event
    /// means nothing to this adapter
    fn interpret(&mut self, event: &RawMediaEvent) -> Option<MediaSignal>;

    /// Release player resources. Idempotent, safe before `mount`.
    fn unmount(&mut self);
}

/// Builds adapters for steps, sharing the embedded provider runtime across mounts.
#[derive(Clone, Debug)]
pub struct MediaFactory {
    rules: SourceRules,
    provider: ProviderLoader,
}

impl MediaFactory {
    pub fn new(rules: SourceRules, provider: ProviderLoader) -> Self {
        MediaFactory { rules, provider }
    }

    pub fn from_config(config: &crate::ViewerConfig) -> Self {
        MediaFactory::new(config.sources.clone(), ProviderLoader::new(config.provider_api_url.clone()))
    }

    pub fn rules(&self) -> &SourceRules {
        &self.rules
    }

    pub fn provider(&self) -> &ProviderLoader {
        &self.provider
    }

    pub fn classify(&self, source_ref: &str) -> SourceKind {
        classify(source_ref, &self.rules)
    }

    /// Adapter for `step`, or [`Error::UnsupportedSource`]
    pub fn adapter_for(&self, step: &Step) -> Result<Box<dyn MediaAdapter>> {
        match self.classify(&step.source_ref) {
            SourceKind::EmbeddedProvider { video_id } => {
                Ok(Box::new(EmbeddedProviderAdapter::new(video_id, self.provider.clone())))
            }
            SourceKind::DirectStream { url } => Ok(Box::new(DirectStreamAdapter::new(url))),
            SourceKind::Unsupported { reason } => Err(Error::UnsupportedSource(format!(
                "{} ({})",
                step.source_ref, reason
            ))),
        }
    }
}

impl Default for MediaFactory {
    fn default() -> Self {
        MediaFactory::from_config(&crate::ViewerConfig::default())
    }
}
