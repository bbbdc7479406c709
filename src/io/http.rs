use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::ReadAt;
use anyhow::{Result, anyhow, bail};

/// Per-request timeout for HEAD probes and Range fetches
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts allowed for a single range before giving up
const DEFAULT_MAX_RETRY: u32 = 10;

/// HTTP Range reader for remote archives
///
/// Every `read_at` becomes one or more `Range: bytes=a-b` requests, so only
/// the central directory and the entries that are actually read ever cross
/// the network.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Create a new HTTP Range reader
    ///
    /// Sends a HEAD request to verify Range support and learn the size.
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let resp = client.head(&url).send().await?;
        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }

        let accept_ranges = resp
            .headers()
            .get(header::ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");
        if !accept_ranges.contains("bytes") {
            bail!("Remote server does not support Range requests");
        }

        // HEAD bodies are empty, so read the header rather than content_length()
        let size = resp
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("Remote server did not return Content-Length"))?;

        tracing::debug!(url = %url, size, "opened remote archive");

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
            max_retry: DEFAULT_MAX_RETRY,
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = (offset + buf.len() as u64 - 1).min(self.size - 1);
        let expected_size = (end - offset + 1) as usize;

        let mut received = 0;
        let mut retry_count = 0;

        while received < expected_size {
            let current_start = offset + received as u64;
            let range = format!("bytes={}-{}", current_start, end);

            let result = self
                .client
                .get(&self.url)
                .header(header::RANGE, &range)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    if resp.status() != StatusCode::PARTIAL_CONTENT {
                        bail!("HTTP request failed with status: {}", resp.status());
                    }

                    let bytes = resp.bytes().await?;
                    if bytes.is_empty() {
                        bail!("Server returned an empty body for range {}", range);
                    }
                    let chunk_len = bytes.len().min(expected_size - received);
                    buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                    received += chunk_len;

                    self.transferred_bytes
                        .fetch_add(chunk_len as u64, Ordering::Relaxed);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        bail!("Max retries exceeded for range {}: {}", range, e);
                    }
                    tracing::warn!(
                        retry = retry_count,
                        max_retry = self.max_retry,
                        range = %range,
                        error = %e,
                        "connection error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
