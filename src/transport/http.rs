//! HTTP delivery of metric snapshots.
//!
//! Every body is gzip-compressed. With a public key configured the
//! compressed bytes are encrypted and flagged with `Content-Encrypted`
//! instead of `Content-Encoding`. With a signing key configured the bytes
//! actually put on the wire are signed into `HashSHA256`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use tracing::{debug, instrument, trace};

use super::{Transport, TransportError};
use crate::codec::{encode_batch, encode_batch_json, gzip};
use crate::crypto::{self, ENCRYPTED_HEADER, PublicKey, SIGNATURE_HEADER};
use crate::MetricSet;

/// Body ready to be sent, with the headers describing it.
#[derive(Debug)]
struct PreparedBody {
    bytes: Vec<u8>,
    encrypted: bool,
    signature: Option<String>,
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    signing_key: Option<Vec<u8>>,
    public_key: Option<PublicKey>,
}

impl HttpTransport {
    /// `address` is either `host:port` or a full `http(s)://` URL.
    pub fn new(address: &str) -> Result<Self, TransportError> {
        let base = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        let base_url = Url::parse(&base).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(base));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url,
            signing_key: None,
            public_key: None,
        })
    }

    pub fn with_signing_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.signing_key = Some(key.into());
        self
    }

    pub fn with_public_key(mut self, key: PublicKey) -> Self {
        self.public_key = Some(key);
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn prepare(&self, raw: &[u8]) -> Result<PreparedBody, TransportError> {
        let compressed = gzip(raw)?;

        let (bytes, encrypted) = match &self.public_key {
            Some(key) => {
                if compressed.len() > key.capacity() {
                    return Err(TransportError::ExceedsCipherCapacity {
                        size: compressed.len(),
                        capacity: key.capacity(),
                    });
                }
                (key.encrypt(&compressed)?, true)
            }
            None => (compressed, false),
        };

        let signature = self
            .signing_key
            .as_deref()
            .map(|key| crypto::sign(key, &bytes));

        Ok(PreparedBody {
            bytes,
            encrypted,
            signature,
        })
    }

    async fn post(&self, url: Url, content_type: &str, body: PreparedBody) -> Result<(), TransportError> {
        let mut request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, content_type)
            .header(ACCEPT_ENCODING, "gzip");

        request = if body.encrypted {
            request.header(ENCRYPTED_HEADER, "true")
        } else {
            request.header(CONTENT_ENCODING, "gzip")
        };

        if let Some(signature) = body.signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.body(body.bytes).send().await?;

        if response.status() != StatusCode::OK {
            return Err(TransportError::Status {
                status: response.status().as_u16(),
            });
        }

        trace!("{url} accepted the request");
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip_all, fields(count = metrics.len()))]
    async fn send_batch(&self, metrics: &MetricSet) -> Result<(), TransportError> {
        if metrics.is_empty() {
            return Ok(());
        }

        let body = self.prepare(&encode_batch_json(metrics)?)?;
        let url = self.endpoint(&["updates", ""])?;

        debug!("sending batch of {} bytes", body.bytes.len());
        self.post(url, "application/json", body).await
    }

    /// Values travel in the URL path; the gzip'd empty body still carries the
    /// encryption and signature headers.
    #[instrument(skip_all, fields(count = metrics.len()))]
    async fn send(&self, metrics: &MetricSet) -> Result<(), TransportError> {
        for metric in encode_batch(metrics) {
            let value = metric
                .payload()
                .map(|value| value.to_string())
                .unwrap_or_default();
            let url = self.endpoint(&["update", metric.kind.as_str(), &metric.id, &value])?;

            let body = self.prepare(&[])?;
            self.post(url, "text/plain", body).await?;
        }

        Ok(())
    }
}
