// Path: crates/http-store-gateway/src/routes.rs
//! Route handlers for the gateway.

use crate::{gate_error_response, observe, AppError};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use haven_api::store::{AllocationStore, BlobStore, ClaimStore};
use haven_crypto::PresignAuthority;
use haven_services::time::now_secs;
use haven_services::CapabilityGate;
use haven_types::id::{Digest, Link};
use std::sync::Arc;
use std::time::Instant;

/// Everything the handlers touch.
pub struct GatewayState {
    /// Dispatches signed command envelopes.
    pub gate: Arc<CapabilityGate>,
    /// Serves and accepts blob bytes.
    pub blobs: Arc<dyn BlobStore>,
    /// Serves archived commitments.
    pub claims: Arc<dyn ClaimStore>,
    /// Backs the upload precondition check.
    pub allocations: Arc<dyn AllocationStore>,
    /// Verifies upload tickets.
    pub presign: PresignAuthority,
}

/// `POST /`: signed command envelope in, signed receipt envelope out.
pub async fn dispatch_handler(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let started = Instant::now();
    match state.gate.dispatch(&body).await {
        Ok(receipt_bytes) => {
            observe("/", "ok", started);
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/octet-stream")],
                receipt_bytes,
            )
                .into_response())
        }
        Err(e) => {
            observe("/", "error", started);
            Err(gate_error_response(&e))
        }
    }
}

/// `GET /blob/{digest}`: streams stored bytes; honors a single `Range`.
pub async fn get_blob_handler(
    State(state): State<Arc<GatewayState>>,
    Path(digest_text): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let digest = Digest::parse(&digest_text)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let result = match parse_range(&headers) {
        Some(range) => serve_range(&state, &digest, range).await,
        None => serve_full(&state, &digest).await,
    };
    observe(
        "/blob",
        if result.is_ok() { "ok" } else { "error" },
        started,
    );
    result
}

async fn serve_full(state: &GatewayState, digest: &Digest) -> Result<Response, AppError> {
    let body = state.blobs.get(digest).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, body.len().to_string()),
        ],
        body,
    )
        .into_response())
}

async fn serve_range(
    state: &GatewayState,
    digest: &Digest,
    range: RequestedRange,
) -> Result<Response, AppError> {
    let size = state.blobs.stat(digest).await?;
    let (start, end) = range.resolve(size).ok_or(AppError::RangeNotSatisfiable { size })?;
    let body = state.blobs.get_range(digest, start, end).await?;
    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, body.len().to_string()),
            (
                header::CONTENT_RANGE,
                format!("bytes {start}-{end}/{size}"),
            ),
        ],
        body,
    )
        .into_response())
}

/// `PUT /blob/{digest}`: accepts bytes under a valid upload ticket.
///
/// 401 on signature failure, 403 without a live allocation, 409 on digest
/// mismatch, 200 on success (including idempotent re-puts).
pub async fn put_blob_handler(
    State(state): State<Arc<GatewayState>>,
    Path(_digest_text): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let result = accept_upload(&state, &uri, &headers, body).await;
    observe(
        "/blob",
        if result.is_ok() { "ok" } else { "error" },
        started,
    );
    result
}

async fn accept_upload(
    state: &GatewayState,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let presented = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let signed_headers: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().eq_ignore_ascii_case("content-length"))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let put = state
        .presign
        .verify(&presented, &signed_headers, now_secs())?;
    if body.len() as u64 != put.size {
        return Err(AppError::BadRequest(format!(
            "body is {} bytes but the ticket covers {}",
            body.len(),
            put.size
        )));
    }

    // The ticket alone is not enough: the reservation must still be live.
    let now = now_secs();
    let reserved = state
        .allocations
        .list(&put.digest)
        .await?
        .iter()
        .any(|a| !a.is_expired(now));
    if !reserved {
        return Err(AppError::Forbidden(
            "no live allocation for this digest".to_string(),
        ));
    }

    state.blobs.put(&put.digest, body).await?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /claim/{link}`: streams the archived signed commitment.
pub async fn get_claim_handler(
    State(state): State<Arc<GatewayState>>,
    Path(link_text): Path<String>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let link =
        Link::parse(&link_text).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let result = state.claims.get_archive(&link).await;
    observe(
        "/claim",
        if result.is_ok() { "ok" } else { "error" },
        started,
    );
    let archive = result?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        archive,
    )
        .into_response())
}

/// A parsed single-range request: `bytes=a-b`, `bytes=a-`, or `bytes=-n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestedRange {
    FromTo(u64, u64),
    From(u64),
    Suffix(u64),
}

impl RequestedRange {
    /// Resolves against a blob size to inclusive offsets, or `None` when
    /// unsatisfiable.
    fn resolve(self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        match self {
            RequestedRange::FromTo(start, end) => {
                let end = end.min(size - 1);
                (start <= end && start < size).then_some((start, end))
            }
            RequestedRange::From(start) => (start < size).then_some((start, size - 1)),
            RequestedRange::Suffix(len) => {
                let len = len.min(size);
                (len > 0).then_some((size - len, size - 1))
            }
        }
    }
}

/// Parses a `Range` header. Multi-range requests are not supported and are
/// served as full reads.
pub fn parse_range(headers: &HeaderMap) -> Option<RequestedRange> {
    let value = headers.get(header::RANGE)?.to_str().ok()?;
    let spec = value.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    match (start.is_empty(), end.is_empty()) {
        (true, false) => end.parse().ok().map(RequestedRange::Suffix),
        (false, true) => start.parse().ok().map(RequestedRange::From),
        (false, false) => {
            let start = start.parse().ok()?;
            let end = end.parse().ok()?;
            Some(RequestedRange::FromTo(start, end))
        }
        (true, true) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, value.parse().unwrap());
        headers
    }

    #[test]
    fn range_forms_parse() {
        assert_eq!(
            parse_range(&range_headers("bytes=0-4")),
            Some(RequestedRange::FromTo(0, 4))
        );
        assert_eq!(
            parse_range(&range_headers("bytes=6-")),
            Some(RequestedRange::From(6))
        );
        assert_eq!(
            parse_range(&range_headers("bytes=-5")),
            Some(RequestedRange::Suffix(5))
        );
        assert_eq!(parse_range(&range_headers("bytes=0-1,3-4")), None);
        assert_eq!(parse_range(&HeaderMap::new()), None);
    }

    #[test]
    fn range_resolution_is_inclusive_and_clamped() {
        assert_eq!(RequestedRange::FromTo(6, 10).resolve(11), Some((6, 10)));
        assert_eq!(RequestedRange::FromTo(6, 99).resolve(11), Some((6, 10)));
        assert_eq!(RequestedRange::FromTo(11, 12).resolve(11), None);
        assert_eq!(RequestedRange::From(6).resolve(11), Some((6, 10)));
        assert_eq!(RequestedRange::Suffix(5).resolve(11), Some((6, 10)));
        assert_eq!(RequestedRange::Suffix(99).resolve(11), Some((0, 10)));
        assert_eq!(RequestedRange::FromTo(0, 0).resolve(0), None);
    }
}
