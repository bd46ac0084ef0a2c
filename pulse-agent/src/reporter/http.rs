//! HTTP report transport.

use std::io::Write;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use rsa::RsaPublicKey;
use tracing::{debug, info, warn};

use pulse_core::crypto::{keys, sign};
use pulse_core::{retry, PulseError, Result};

use crate::collector::SharedMetrics;
use crate::reporter::{build_payload, Reporter};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(3);

/// Ships reports as gzip-compressed JSON over HTTP POST.
///
/// The body is signed over its plaintext, then optionally encrypted,
/// then compressed; the server undoes the steps in reverse.
pub struct HttpReporter {
    metrics: SharedMetrics,
    client: reqwest::Client,
    url: String,
    hash_key: Option<Vec<u8>>,
    public_key: Option<RsaPublicKey>,
    local_ip: Option<IpAddr>,
}

impl HttpReporter {
    pub fn new(
        metrics: SharedMetrics,
        url: String,
        hash_key: Option<Vec<u8>>,
        public_key: Option<RsaPublicKey>,
        local_ip: Option<IpAddr>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| PulseError::Internal(format!("can't build HTTP client: {e}")))?;

        Ok(Self { metrics, client, url, hash_key, public_key, local_ip })
    }

    async fn send_request(&self, body: &[u8], digest: Option<&str>) -> Result<()> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(body)
            .map_err(|e| PulseError::decode(format!("can't compress body: {e}")))?;
        let compressed = encoder
            .finish()
            .map_err(|e| PulseError::decode(format!("can't compress body: {e}")))?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Content-Encoding", "gzip")
            .body(compressed);

        if let Some(ip) = self.local_ip {
            request = request.header("X-Real-IP", ip.to_string());
        }
        if let Some(digest) = digest {
            request = request.header("HashSHA256", digest);
        }

        let response = request.send().await.map_err(PulseError::transport)?;
        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "server rejected report");
        }

        Ok(())
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    /// Prepare and send one report. Transport failures retry on the
    /// shared schedule; marshal, signing, and encryption failures
    /// abort immediately.
    async fn send_report(&self) -> Result<()> {
        let payload = {
            let metrics = self.metrics.read().await;
            build_payload(&metrics)
        };

        let mut body = serde_json::to_vec(&payload)
            .map_err(|e| PulseError::Internal(format!("failed to marshal report: {e}")))?;

        let digest = match &self.hash_key {
            Some(key) => {
                let digest = sign::sign(&body, key)?;
                debug!(hash = %digest, "report body signed");
                Some(digest)
            }
            None => None,
        };

        if let Some(public_key) = &self.public_key {
            body = keys::encrypt(public_key, &body)?;
            debug!("report body encrypted");
        }

        retry::with_backoff(&retry::DEFAULT_BACKOFF, || {
            self.send_request(&body, digest.as_deref())
        })
        .await?;

        info!(metrics = payload.len(), "report sent");
        Ok(())
    }
}
