//! RFC 3161 Time-Stamping Authority client.
//!
//! Submits a bundle hash to a configured TSA endpoint and returns the fields
//! the ledger persists. Submission always happens out-of-band relative to the
//! bundle-creating request (see `worker`), so TSA latency or outages never
//! block call finalization: a failed attempt leaves the bundle `pending` and
//! the recovery sweep advances it later.

pub mod der;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub use der::{extract_tst_info, DerError, TstInfo};

const CONTENT_TYPE_QUERY: &str = "application/timestamp-query";
const CONTENT_TYPE_REPLY: &str = "application/timestamp-reply";

/// TSA client configuration.
#[derive(Debug, Clone)]
pub struct TsaConfig {
    /// TSA endpoint; `None` means bundles are created `not_configured`
    pub url: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries within one submission batch; recovery retries beyond this
    pub max_retries: u32,
    /// Cap on the exponential backoff between retries
    pub max_backoff: Duration,
}

impl Default for TsaConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(10),
            max_retries: 3,
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Fields persisted onto a bundle by the one-way TSA attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsaAttachment {
    pub tsa_url: String,
    /// genTime from the token's TSTInfo
    pub timestamp: DateTime<Utc>,
    pub policy_oid: Option<String>,
    pub serial: Option<String>,
    /// Raw token, base64
    pub token_b64: String,
    /// `sha256:` digest of the raw token bytes
    pub token_hash: String,
}

/// TSA submission failures.
///
/// Only `Unavailable` is transient; it is recorded as `pending` on the
/// bundle, retried with backoff, and never surfaced to the finalizing caller.
#[derive(Debug, Error)]
pub enum TsaError {
    #[error("no tsa endpoint configured")]
    NotConfigured,

    /// Network failure, timeout, or 5xx — worth retrying.
    #[error("tsa unavailable: {message}")]
    Unavailable { message: String },

    /// The TSA answered but refused the request (PKIStatus >= 2).
    #[error("tsa rejected the request with status {status}")]
    Rejected { status: u64 },

    /// Malformed input or response: bad bundle hash, undecodable DER, or a
    /// token whose message imprint does not match what we submitted.
    #[error("tsa protocol error: {message}")]
    Protocol { message: String },

    #[error("failed to construct tsa http client: {message}")]
    Client { message: String },
}

impl TsaError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// HTTP client for one TSA endpoint.
#[derive(Debug, Clone)]
pub struct TsaClient {
    http: reqwest::Client,
    config: TsaConfig,
}

impl TsaClient {
    pub fn new(config: TsaConfig) -> Result<Self, TsaError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TsaError::Client {
                message: e.to_string(),
            })?;
        Ok(Self { http, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.url.is_some()
    }

    /// Request a timestamp over `bundle_hash` (`sha256:<hex>`), retrying
    /// transient failures with jittered exponential backoff.
    pub async fn timestamp(&self, bundle_hash: &str) -> Result<TsaAttachment, TsaError> {
        let url = self.config.url.clone().ok_or(TsaError::NotConfigured)?;
        let imprint = decode_bundle_hash(bundle_hash)?;

        let mut retries = 0;
        loop {
            match self.submit_once(&url, &imprint).await {
                Ok(attachment) => return Ok(attachment),
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    retries += 1;
                    let backoff = jittered_backoff(retries, self.config.max_backoff);
                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = self.config.max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying tsa submission"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn submit_once(
        &self,
        url: &str,
        imprint: &[u8; 32],
    ) -> Result<TsaAttachment, TsaError> {
        let nonce: u64 = rand::random();
        let body = der::encode_timestamp_req(imprint, nonce);

        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_QUERY)
            .header(reqwest::header::ACCEPT, CONTENT_TYPE_REPLY)
            .body(body)
            .send()
            .await
            .map_err(|e| TsaError::Unavailable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_server_error()
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            return Err(TsaError::Unavailable {
                message: format!("http status {status}"),
            });
        }
        if !status.is_success() {
            return Err(TsaError::Protocol {
                message: format!("unexpected http status {status}"),
            });
        }

        let bytes = response.bytes().await.map_err(|e| TsaError::Unavailable {
            message: format!("failed to read tsa response: {e}"),
        })?;

        let resp = der::parse_timestamp_resp(&bytes).map_err(|e| TsaError::Protocol {
            message: e.to_string(),
        })?;

        // PKIStatus: 0 = granted, 1 = grantedWithMods
        if resp.status > 1 {
            return Err(TsaError::Rejected {
                status: resp.status,
            });
        }
        let token = resp.token.ok_or_else(|| TsaError::Protocol {
            message: "granted response carried no timestamp token".into(),
        })?;

        let info = der::extract_tst_info(&token).map_err(|e| TsaError::Protocol {
            message: e.to_string(),
        })?;
        if info.message_imprint != imprint {
            return Err(TsaError::Protocol {
                message: "token message imprint does not match submitted hash".into(),
            });
        }

        debug!(
            serial = %info.serial_hex,
            policy = %info.policy_oid,
            gen_time = %info.gen_time,
            "tsa token granted"
        );

        Ok(TsaAttachment {
            tsa_url: url.to_string(),
            timestamp: info.gen_time,
            policy_oid: Some(info.policy_oid),
            serial: Some(info.serial_hex),
            token_b64: BASE64.encode(&token),
            token_hash: crate::crypto::sha256_hex(&token),
        })
    }
}

/// `sha256:<64 hex>` → 32 raw bytes.
fn decode_bundle_hash(bundle_hash: &str) -> Result<[u8; 32], TsaError> {
    let hex_part = bundle_hash
        .strip_prefix("sha256:")
        .ok_or_else(|| TsaError::Protocol {
            message: format!("bundle hash missing sha256: prefix: {bundle_hash}"),
        })?;
    let bytes = hex::decode(hex_part).map_err(|e| TsaError::Protocol {
        message: format!("bundle hash is not hex: {e}"),
    })?;
    bytes.try_into().map_err(|_| TsaError::Protocol {
        message: "bundle hash is not 32 bytes".into(),
    })
}

fn jittered_backoff(retries: u32, max_backoff: Duration) -> Duration {
    use rand::Rng;
    let base = Duration::from_secs(1u64 << retries.min(10)).min(max_backoff);
    let jittered_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64);
    Duration::from_millis(jittered_ms.max(10))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256_hex;
    use chrono::TimeZone;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config(url: Option<String>) -> TsaConfig {
        TsaConfig {
            url,
            timeout: Duration::from_secs(2),
            max_retries: 1,
            max_backoff: Duration::from_millis(20),
        }
    }

    fn bundle_hash_and_imprint() -> (String, [u8; 32]) {
        let hash = sha256_hex(b"bundle under test");
        let mut imprint = [0u8; 32];
        imprint.copy_from_slice(&hex::decode(hash.strip_prefix("sha256:").unwrap()).unwrap());
        (hash, imprint)
    }

    #[tokio::test]
    async fn test_unconfigured_client_reports_not_configured() {
        let client = TsaClient::new(fast_config(None)).unwrap();
        let (hash, _) = bundle_hash_and_imprint();
        let err = client.timestamp(&hash).await.unwrap_err();
        assert!(matches!(err, TsaError::NotConfigured));
    }

    #[tokio::test]
    async fn test_granted_token_becomes_attachment() {
        let (hash, imprint) = bundle_hash_and_imprint();
        let gen_time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 10, 0).unwrap();
        let body = crate::tsa::testutil::granted_response(&imprint, 0x42, gen_time);

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", CONTENT_TYPE_QUERY))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", CONTENT_TYPE_REPLY)
                    .set_body_bytes(body),
            )
            .mount(&server)
            .await;

        let client = TsaClient::new(fast_config(Some(server.uri()))).unwrap();
        let attachment = client.timestamp(&hash).await.unwrap();

        assert_eq!(attachment.timestamp, gen_time);
        assert_eq!(attachment.serial.as_deref(), Some("42"));
        assert_eq!(
            attachment.policy_oid.as_deref(),
            Some(crate::tsa::testutil::TEST_POLICY_DOTTED)
        );
        assert!(attachment.token_hash.starts_with("sha256:"));
        // token_hash binds the stored base64 to the raw bytes
        let raw = BASE64.decode(attachment.token_b64.as_bytes()).unwrap();
        assert_eq!(sha256_hex(&raw), attachment.token_hash);
    }

    #[tokio::test]
    async fn test_outage_is_unavailable_after_bounded_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2) // initial attempt + one retry
            .mount(&server)
            .await;

        let client = TsaClient::new(fast_config(Some(server.uri()))).unwrap();
        let (hash, _) = bundle_hash_and_imprint();
        let err = client.timestamp(&hash).await.unwrap_err();
        assert!(err.is_retryable(), "got {err}");
    }

    #[tokio::test]
    async fn test_rejection_is_terminal_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(crate::tsa::testutil::rejected_response()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = TsaClient::new(fast_config(Some(server.uri()))).unwrap();
        let (hash, _) = bundle_hash_and_imprint();
        let err = client.timestamp(&hash).await.unwrap_err();
        assert!(matches!(err, TsaError::Rejected { status: 2 }));
    }

    #[tokio::test]
    async fn test_imprint_mismatch_is_protocol_error() {
        let (hash, _) = bundle_hash_and_imprint();
        let gen_time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 10, 0).unwrap();
        // Token over a DIFFERENT imprint than the one submitted
        let body = crate::tsa::testutil::granted_response(&[0xee; 32], 1, gen_time);

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let client = TsaClient::new(fast_config(Some(server.uri()))).unwrap();
        let err = client.timestamp(&hash).await.unwrap_err();
        assert!(matches!(err, TsaError::Protocol { .. }), "got {err}");
    }

    #[test]
    fn test_decode_bundle_hash_validation() {
        assert!(decode_bundle_hash("deadbeef").is_err());
        assert!(decode_bundle_hash("sha256:zz").is_err());
        assert!(decode_bundle_hash("sha256:abcd").is_err());
        let (hash, imprint) = bundle_hash_and_imprint();
        assert_eq!(decode_bundle_hash(&hash).unwrap(), imprint);
    }
}
