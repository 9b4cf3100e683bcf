use std::io::Read;
use std::time::Duration;

use url::Url;

use super::types::{FetchError, MirrorFailure};

/// Substrings every genuine MA-L export contains in its header.
const REQUIRED_MARKERS: &[&str] = &["OUI/MA-L", "Organization"];

/// The full export is a few MB; anything past this is not the registry.
const MAX_BODY_BYTES: u64 = 50_000_000;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Anything able to produce raw registry text.
pub trait RegistrySource: Send + Sync {
    fn fetch(&self) -> Result<String, FetchError>;
}

/// Downloads the registry over HTTP, walking the mirror list in priority order.
pub struct HttpRegistryFetcher {
    client: reqwest::blocking::Client,
    mirrors: Vec<Url>,
    min_content_length: u64,
    max_body_bytes: u64,
}

impl HttpRegistryFetcher {
    pub fn new(
        mirrors: Vec<Url>,
        timeout: Duration,
        min_content_length: u64,
    ) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            mirrors,
            min_content_length,
            max_body_bytes: MAX_BODY_BYTES,
        })
    }

    #[cfg(test)]
    fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    fn fetch_mirror(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/plain")
            .send()?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        // Reject truncated downloads up front when the server declares a size
        if let Some(declared) = response.content_length()
            && declared < self.min_content_length
        {
            return Err(FetchError::TooSmall {
                declared,
                minimum: self.min_content_length,
            });
        }

        // One byte past the cap tells an oversized body apart from one that fits exactly
        let mut bytes = Vec::new();
        response
            .take(self.max_body_bytes + 1)
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 > self.max_body_bytes {
            return Err(FetchError::TooLarge {
                limit: self.max_body_bytes,
            });
        }

        // Registrant names occasionally carry Latin-1 bytes
        let body = String::from_utf8_lossy(&bytes).into_owned();

        validate_registry_body(&body)?;
        Ok(body)
    }
}

impl RegistrySource for HttpRegistryFetcher {
    fn fetch(&self) -> Result<String, FetchError> {
        if self.mirrors.is_empty() {
            return Err(FetchError::NoMirrors);
        }

        let mut failures = Vec::with_capacity(self.mirrors.len());

        for url in &self.mirrors {
            tracing::info!(%url, "Downloading OUI registry");
            match self.fetch_mirror(url) {
                Ok(body) => {
                    tracing::info!(%url, chars = body.len(), "Download completed");
                    return Ok(body);
                }
                Err(e) => {
                    tracing::warn!(%url, error = %e, "Mirror rejected");
                    failures.push(MirrorFailure {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::error!("Could not download the OUI registry from any mirror");
        Err(FetchError::AllMirrorsFailed(failures))
    }
}

/// Check that a body looks like the MA-L export rather than an error page.
pub fn validate_registry_body(body: &str) -> Result<(), FetchError> {
    if REQUIRED_MARKERS.iter().all(|marker| body.contains(marker)) {
        Ok(())
    } else {
        Err(FetchError::InvalidContent)
    }
}
