// Path: crates/services/src/remote/mod.rs
//! HTTP implementations of the remote seams.
//!
//! Peer nodes, the upload service, and the indexing service all speak the
//! same protocol: canonical envelope bytes POSTed to their command endpoint,
//! canonical receipt bytes back. Blob bytes flow over plain GET/PUT with the
//! grant attached as a header.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::TryStreamExt;
use haven_api::crypto::NodeSigner;
use haven_api::remote::{
    ByteStream, IndexingService, PeerTransport, RemoteError, UploadService,
};
use haven_crypto::envelope::sign_invocation;
use haven_crypto::NodeIdentity;
use haven_types::capability::{
    AccessGrantCaveats, AccessGrantOk, ClaimCacheCaveats, GrantRequest, ProviderInfo,
    UcanConcludeCaveats, ACCESS_GRANT, CLAIM_CACHE, UCAN_CONCLUDE,
};
use haven_types::claim::{LocationCommitment, UploadAddress};
use haven_types::codec;
use haven_types::id::Did;
use haven_types::invocation::{Delegation, Envelope, InvocationPayload, Outcome, Receipt};
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the base64 canonical encoding of a `blob/retrieve` grant.
pub const GRANT_HEADER: &str = "x-haven-grant";

/// Builds the shared HTTP client with transport-level timeouts. Request
/// deadlines are the caller's business (the replication engine wraps whole
/// attempts in its job timeout).
pub fn build_client() -> Result<reqwest::Client, RemoteError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| RemoteError::Http(e.to_string()))
}

fn http_err(e: reqwest::Error) -> RemoteError {
    RemoteError::Http(e.to_string())
}

async fn rejected(response: reqwest::Response) -> RemoteError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(256)
        .collect();
    RemoteError::Rejected { status, body }
}

/// POSTs an envelope to a command endpoint and decodes the signed receipt.
async fn post_envelope(
    http: &reqwest::Client,
    url: &str,
    envelope: &Envelope,
) -> Result<Receipt, RemoteError> {
    let response = http
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
        .body(codec::to_bytes_canonical(envelope))
        .send()
        .await
        .map_err(http_err)?;
    if !response.status().is_success() {
        return Err(rejected(response).await);
    }
    let body = response.bytes().await.map_err(http_err)?;
    codec::from_bytes_canonical(&body).map_err(RemoteError::Codec)
}

/// HTTP plumbing toward peer nodes and announce endpoints.
pub struct HttpPeerTransport {
    http: reqwest::Client,
    identity: Arc<NodeIdentity>,
}

impl HttpPeerTransport {
    /// Builds the transport over a shared client.
    pub fn new(http: reqwest::Client, identity: Arc<NodeIdentity>) -> Self {
        Self { http, identity }
    }

    /// The peer's command endpoint: the root of the URL it serves blobs
    /// from.
    fn command_endpoint(url: &str) -> Result<String, RemoteError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| RemoteError::Http(e.to_string()))?;
        parsed
            .join("/")
            .map(|u| u.to_string())
            .map_err(|e| RemoteError::Http(e.to_string()))
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn grant(
        &self,
        peer_url: &str,
        peer: &Did,
        ability: &str,
    ) -> Result<Delegation, RemoteError> {
        let invocation = sign_invocation(
            self.identity.as_ref(),
            InvocationPayload {
                issuer: self.identity.did().clone(),
                audience: peer.clone(),
                subject: peer.clone(),
                ability: ACCESS_GRANT.to_string(),
                caveats: codec::to_bytes_canonical(&AccessGrantCaveats {
                    att: vec![GrantRequest {
                        can: ability.to_string(),
                    }],
                    cause: None,
                }),
                cause: None,
                not_before: None,
                expiration: None,
                nonce: crate::time::now_secs(),
            },
        )
        .map_err(|e| RemoteError::Http(e.to_string()))?;

        let endpoint = Self::command_endpoint(peer_url)?;
        let receipt = post_envelope(
            &self.http,
            &endpoint,
            &Envelope {
                invocation,
                proofs: Vec::new(),
            },
        )
        .await?;

        let ok = match receipt.payload.out {
            Outcome::Ok(bytes) => bytes,
            Outcome::Error(failure) => {
                return Err(RemoteError::Rejected {
                    status: 200,
                    body: failure.code,
                })
            }
        };
        let granted: AccessGrantOk =
            codec::from_bytes_canonical(&ok).map_err(RemoteError::Codec)?;
        let first = granted
            .delegations
            .first()
            .ok_or_else(|| RemoteError::Codec("grant carried no delegations".to_string()))?;
        codec::from_bytes_canonical(first).map_err(RemoteError::Codec)
    }

    async fn fetch(
        &self,
        url: &str,
        proof: Option<&Delegation>,
    ) -> Result<ByteStream, RemoteError> {
        let mut request = self.http.get(url);
        if let Some(proof) = proof {
            request = request.header(GRANT_HEADER, BASE64.encode(codec::to_bytes_canonical(proof)));
        }
        let response = request.send().await.map_err(http_err)?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(Box::pin(response.bytes_stream().map_err(http_err)))
    }

    async fn store(
        &self,
        sink: &UploadAddress,
        body: ByteStream,
        len: u64,
    ) -> Result<(), RemoteError> {
        let mut request = self
            .http
            .put(&sink.url)
            .header(reqwest::header::CONTENT_LENGTH, len);
        for (name, value) in &sink.headers {
            // Content-Length is set once above; appending it again would
            // duplicate the header.
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(http_err)?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(())
    }

    async fn announce(&self, url: &str, payload: &[u8]) -> Result<(), RemoteError> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(http_err)?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(())
    }
}

/// `ucan/conclude` delivery to the upload service.
pub struct HttpUploadService {
    http: reqwest::Client,
    identity: Arc<NodeIdentity>,
    url: String,
    service: Did,
}

impl HttpUploadService {
    /// Builds the client for the configured upload service.
    pub fn new(
        http: reqwest::Client,
        identity: Arc<NodeIdentity>,
        url: impl Into<String>,
        service: Did,
    ) -> Self {
        Self {
            http,
            identity,
            url: url.into(),
            service,
        }
    }
}

#[async_trait]
impl UploadService for HttpUploadService {
    async fn conclude(&self, receipt: &Receipt) -> Result<(), RemoteError> {
        let invocation = sign_invocation(
            self.identity.as_ref(),
            InvocationPayload {
                issuer: self.identity.did().clone(),
                audience: self.service.clone(),
                subject: self.service.clone(),
                ability: UCAN_CONCLUDE.to_string(),
                caveats: codec::to_bytes_canonical(&UcanConcludeCaveats {
                    receipt: codec::to_bytes_canonical(receipt),
                }),
                cause: Some(receipt.payload.ran),
                not_before: None,
                expiration: None,
                nonce: crate::time::now_secs(),
            },
        )
        .map_err(|e| RemoteError::Http(e.to_string()))?;

        let conclude_receipt = post_envelope(
            &self.http,
            &self.url,
            &Envelope {
                invocation,
                proofs: Vec::new(),
            },
        )
        .await?;
        match conclude_receipt.payload.out {
            Outcome::Ok(_) => Ok(()),
            Outcome::Error(failure) => Err(RemoteError::Rejected {
                status: 200,
                body: failure.code,
            }),
        }
    }
}

/// `claim/cache` delivery to the indexing service.
pub struct HttpIndexingService {
    http: reqwest::Client,
    identity: Arc<NodeIdentity>,
    url: String,
    service: Did,
}

impl HttpIndexingService {
    /// Builds the client for the configured indexing service.
    pub fn new(
        http: reqwest::Client,
        identity: Arc<NodeIdentity>,
        url: impl Into<String>,
        service: Did,
    ) -> Self {
        Self {
            http,
            identity,
            url: url.into(),
            service,
        }
    }
}

#[async_trait]
impl IndexingService for HttpIndexingService {
    async fn cache_claim(
        &self,
        claim: &LocationCommitment,
        provider: &ProviderInfo,
    ) -> Result<(), RemoteError> {
        let invocation = sign_invocation(
            self.identity.as_ref(),
            InvocationPayload {
                issuer: self.identity.did().clone(),
                audience: self.service.clone(),
                subject: self.service.clone(),
                ability: CLAIM_CACHE.to_string(),
                caveats: codec::to_bytes_canonical(&ClaimCacheCaveats {
                    claim: codec::to_bytes_canonical(claim),
                    provider: provider.clone(),
                }),
                cause: None,
                not_before: None,
                expiration: None,
                nonce: crate::time::now_secs(),
            },
        )
        .map_err(|e| RemoteError::Http(e.to_string()))?;

        let receipt = post_envelope(
            &self.http,
            &self.url,
            &Envelope {
                invocation,
                proofs: Vec::new(),
            },
        )
        .await?;
        match receipt.payload.out {
            Outcome::Ok(_) => Ok(()),
            Outcome::Error(failure) => Err(RemoteError::Rejected {
                status: 200,
                body: failure.code,
            }),
        }
    }
}
