//! Reachability checks for direct streams.
//!
//! Probing is optional and never decides completion; a failed probe is fed
//! back to the controller as a transport error for the probed mount.

use url::Url;

use crate::Result;

/// Checks that a direct stream can be fetched
pub trait SourceProbe: Send + Sync {
    fn probe(&self, url: &Url) -> Result<()>;
}

#[cfg(feature = "http")]
pub use http::HttpProbe;

#[cfg(feature = "http")]
mod http {
    use super::SourceProbe;
    use crate::{Error, Result, ViewerConfig};
    use reqwest::blocking::Client;
    use reqwest::StatusCode;
    use std::time::Duration;
    use url::Url;

    /// Blocking HTTP probe: `HEAD`, falling back to a one-byte ranged `GET`
    /// for servers that refuse `HEAD`.
    pub struct HttpProbe {
        client: Client,
    }

    impl HttpProbe {
        pub fn new(config: &ViewerConfig) -> Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_millis(config.probe_timeout_ms))
                .user_agent(config.user_agent.clone())
                .build()
                .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
            Ok(HttpProbe { client })
        }
    }

    impl SourceProbe for HttpProbe {
        fn probe(&self, url: &Url) -> Result<()> {
            let mut status = self.client.head(url.as_str()).send()?.status();
            if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED {
                status = self
                    .client
                    .get(url.as_str())
                    .header(reqwest::header::RANGE, "bytes=0-0")
                    .send()?
                    .status();
            }
            if status.is_success() {
                log::debug!("probe {} -> {}", url, status);
                Ok(())
            } else {
                Err(Error::NetworkError(format!("{} returned {}", url, status)))
            }
        }
    }
}
