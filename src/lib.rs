//! stepgate
//!
//! Sequential unlock and progress tracking for step-based content viewers.
//! A sequence (for example the video parts of one course material) is
//! consumed in order: a step unlocks only once the previous step has been
//! completed, either by playing its media to a natural end or through an
//! explicit "mark as complete" override.
//!
//! # Features
//!
//! - **Gating**: derived lock state, monotonic completion ledger
//! - **Media adapters**: embedded-provider videos and direct file streams
//!   normalized into one completion signal; stale player events are discarded
//! - **Resume**: ledger snapshots with pluggable storage
//! - **Async facade**: a worker-backed [`Viewer`] with broadcast events
//!
//! # Example
//!
//! ```
//! use stepgate::{EventSink, MediaFactory, RawMediaEvent, Selection, SequenceController, Step};
//! use stepgate::media::ElementEvent;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let steps = vec![
//!     Step::new("part-1", 0, "https://cdn.example.com/part-1.mp4"),
//!     Step::new("part-2", 1, "https://youtu.be/dQw4w9WgXcQ"),
//! ];
//! let mut viewer = SequenceController::from_steps("material-42", steps, MediaFactory::default(), EventSink::new())?;
//!
//! assert_eq!(viewer.select_step(1)?, Selection::Denied);
//! if let Selection::Mounted { token } = viewer.select_step(0)? {
//!     viewer.handle_media_event(token, RawMediaEvent::Element(ElementEvent::Ended))?;
//! }
//! assert!(viewer.is_unlocked(1));
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod controller;
pub mod events;
pub mod ledger;
pub mod media;
pub mod persist;
pub mod sequence;
pub mod shell;

// Async-friendly viewer (worker-backed abstraction)
pub mod async_api;

pub use async_api::Viewer;
pub use controller::{MediaOutcome, PlaybackSession, Selection, SequenceController, StepState};
pub use events::{EventLog, EventSink, ViewerEvent};
pub use ledger::{LedgerSnapshot, Progress, ProgressLedger};
pub use media::{classify, MediaFactory, MediaState, RawMediaEvent, SourceKind, SourceRules};
pub use persist::{JsonFileStore, LedgerStore, MemoryLedgerStore};
pub use sequence::{Sequence, Step, StepId};
pub use shell::{StepView, ViewerState};

/// Configuration for a viewer session
///
/// The defaults are conservative: no network probing, the common embedded
/// provider hosts, and the usual browser-playable file extensions.
///
/// # Examples
///
/// ```
/// let cfg = stepgate::ViewerConfig::default();
/// assert!(!cfg.probe_direct_sources);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Source classification rules
    pub sources: SourceRules,
    /// Location of the embedded provider's player API script
    pub provider_api_url: String,
    /// Probe direct streams over HTTP when they are mounted
    pub probe_direct_sources: bool,
    /// Timeout for a single probe in milliseconds
    pub probe_timeout_ms: u64,
    /// User agent sent with probe requests
    pub user_agent: String,
    /// Capacity of the async event broadcast channel
    pub event_capacity: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            sources: SourceRules::default(),
            provider_api_url: "https://www.youtube.com/iframe_api".to_string(),
            probe_direct_sources: false,
            probe_timeout_ms: 10000,
            user_agent: format!("stepgate/{}", env!("CARGO_PKG_VERSION")),
            event_capacity: 64,
        }
    }
}

impl ViewerConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("cannot read {}: {}", path.display(), e)))?;
        let cfg: ViewerConfig = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::ConfigError("event_capacity must be at least 1".to_string()));
        }
        if self.probe_timeout_ms == 0 {
            return Err(Error::ConfigError("probe_timeout_ms must be positive".to_string()));
        }
        if self.sources.direct_extensions.iter().any(|e| e.starts_with('.')) {
            return Err(Error::ConfigError(
                "direct_extensions are given without the leading dot".to_string(),
            ));
        }
        url::Url::parse(&self.provider_api_url)
            .map_err(|e| Error::ConfigError(format!("provider_api_url: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ViewerConfig::default();
        assert_eq!(config.event_capacity, 64);
        assert!(config.user_agent.starts_with("stepgate/"));
        assert!(config.sources.embedded_hosts.iter().any(|h| h == "youtu.be"));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: ViewerConfig = serde_json::from_str(r#"{"probe_direct_sources": true}"#).unwrap();
        assert!(cfg.probe_direct_sources);
        assert_eq!(cfg.probe_timeout_ms, 10000);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let zero = ViewerConfig {
            event_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(Error::ConfigError(_))));

        let mut dotted = ViewerConfig::default();
        dotted.sources.direct_extensions.push(".mkv".into());
        assert!(dotted.validate().is_err());

        let bad_url = ViewerConfig {
            provider_api_url: "not a url".into(),
            ..Default::default()
        };
        assert!(bad_url.validate().is_err());
    }
}
