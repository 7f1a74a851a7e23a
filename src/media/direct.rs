//! Direct file streams played by a native media element.

use url::Url;

use super::{ElementEvent, MediaAdapter, MediaHandle, MediaSignal, RawMediaEvent, SourceKind};
use crate::Result;

/// A seek landing this close to the end counts as a manual skip to the end
const END_EPSILON_SECS: f64 = 0.5;

/// Adapter for media files served over HTTP(S)
pub struct DirectStreamAdapter {
    kind: SourceKind,
    mounted: bool,
    scrubbed_to_end: bool,
}

impl DirectStreamAdapter {
    pub fn new(url: Url) -> Self {
        DirectStreamAdapter {
            kind: SourceKind::DirectStream { url },
            mounted: false,
            scrubbed_to_end: false,
        }
    }

    pub fn url(&self) -> Option<&Url> {
        match &self.kind {
            SourceKind::DirectStream { url } => Some(url),
            _ => None,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }
}

impl MediaAdapter for DirectStreamAdapter {
    fn kind(&self) -> &SourceKind {
        &self.kind
    }

    fn mount(&mut self, handle: &MediaHandle) -> Result<()> {
        self.mounted = true;
        self.scrubbed_to_end = false;
        if let Some(url) = self.url() {
            log::debug!("mounted direct stream {} for step {}", url, handle.step_index());
        }
        Ok(())
    }

    fn interpret(&mut self, event: &RawMediaEvent) -> Option<MediaSignal> {
        let ev = match event {
            RawMediaEvent::Element(ev) => ev,
            RawMediaEvent::TransportError(msg) => return Some(MediaSignal::Failed(msg.clone())),
            other => {
                log::warn!("provider event {:?} sent to a direct stream; ignored", other);
                return None;
            }
        };
        match ev {
            ElementEvent::Loaded => Some(MediaSignal::Ready),
            ElementEvent::Play | ElementEvent::Playing => Some(MediaSignal::Playing),
            ElementEvent::Pause => Some(MediaSignal::Paused),
            ElementEvent::Waiting => Some(MediaSignal::Buffering),
            ElementEvent::Seeked { position, duration } => {
                self.scrubbed_to_end =
                    duration.is_finite() && *duration > 0.0 && *position >= duration - END_EPSILON_SECS;
                None
            }
            ElementEvent::Ended => {
                let natural = !self.scrubbed_to_end;
                self.scrubbed_to_end = false;
                Some(MediaSignal::Ended { natural })
            }
            ElementEvent::Error(msg) => Some(MediaSignal::Failed(msg.clone())),
        }
    }

    fn unmount(&mut self) {
        self.mounted = false;
        self.scrubbed_to_end = false;
    }
}
