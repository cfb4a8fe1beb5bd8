// Path: crates/crypto/src/presign.rs
//! Derivation and verification of presigned upload tickets.
//!
//! The ticket signature is a deterministic Ed25519 signature by the node key
//! over a canonical request string covering the method, the URL path, every
//! query parameter except the signature itself, and the signed headers
//! (including `Content-Length`). Verification recomputes the string from the
//! presented URL and headers and needs no server-side session state.

use crate::error::{CryptoError, PresignError};
use crate::identity::NodeIdentity;
use haven_api::crypto::NodeSigner;
use haven_types::claim::UploadAddress;
use haven_types::id::Digest;
use std::sync::Arc;
use url::Url;

/// The query parameter carrying the ticket expiry.
const EXPIRES_PARAM: &str = "expires";
/// The query parameter carrying the hex signature.
const SIGNATURE_PARAM: &str = "signature";

/// What a verified PUT is allowed to write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedPut {
    /// The digest named in the URL path.
    pub digest: Digest,
    /// The `Content-Length` the ticket was signed for.
    pub size: u64,
    /// Ticket expiry as unix seconds.
    pub expires: u64,
}

/// Issues and verifies upload tickets for this node.
///
/// Holds only the node identity and the public base URL; read-only after
/// construction.
#[derive(Clone)]
pub struct PresignAuthority {
    identity: Arc<NodeIdentity>,
    public_url: String,
}

impl PresignAuthority {
    /// Builds an authority serving tickets under `public_url`.
    pub fn new(identity: Arc<NodeIdentity>, public_url: impl Into<String>) -> Self {
        let mut public_url = public_url.into();
        while public_url.ends_with('/') {
            public_url.pop();
        }
        Self {
            identity,
            public_url,
        }
    }

    /// Derives a ticket for uploading `size` bytes under `digest`, valid for
    /// `ttl_secs` from `now`.
    pub fn sign(
        &self,
        digest: &Digest,
        size: u64,
        ttl_secs: u64,
        now: u64,
    ) -> Result<UploadAddress, PresignError> {
        if !digest.is_sha2_256() {
            return Err(PresignError::UnsupportedDigest);
        }
        let expires = now + ttl_secs;
        let path = format!("/blob/{digest}");
        let query = vec![(EXPIRES_PARAM.to_string(), expires.to_string())];
        let headers = vec![("content-length".to_string(), size.to_string())];

        let canonical = canonical_request(&path, &query, &headers);
        let signature = self
            .identity
            .sign(canonical.as_bytes())
            .map_err(PresignError::Crypto)?;

        let url = format!(
            "{}{path}?{EXPIRES_PARAM}={expires}&{SIGNATURE_PARAM}={}",
            self.public_url,
            hex::encode(signature)
        );
        Ok(UploadAddress {
            url,
            headers,
            expires,
        })
    }

    /// Verifies a presented URL + header set and returns what it authorizes.
    ///
    /// Accepts either the absolute ticket URL or the path-and-query form the
    /// HTTP listener sees.
    pub fn verify(
        &self,
        url: &str,
        headers: &[(String, String)],
        now: u64,
    ) -> Result<VerifiedPut, PresignError> {
        let parsed = self.parse_url(url)?;
        let path = parsed.path().to_string();

        let digest_text = path
            .strip_prefix("/blob/")
            .ok_or_else(|| PresignError::Malformed(format!("unexpected path {path}")))?;
        let digest = Digest::parse(digest_text)
            .map_err(|e| PresignError::Malformed(format!("digest in path: {e}")))?;
        if !digest.is_sha2_256() {
            return Err(PresignError::UnsupportedDigest);
        }

        let mut signature_hex = None;
        let mut query: Vec<(String, String)> = Vec::new();
        for (k, v) in parsed.query_pairs() {
            if k == SIGNATURE_PARAM {
                signature_hex = Some(v.to_string());
            } else {
                query.push((k.to_string(), v.to_string()));
            }
        }
        let signature_hex =
            signature_hex.ok_or_else(|| PresignError::Malformed("missing signature".into()))?;
        let signature = hex::decode(&signature_hex)
            .map_err(|_| PresignError::SignatureInvalid)?;

        let expires: u64 = query
            .iter()
            .find(|(k, _)| k == EXPIRES_PARAM)
            .ok_or_else(|| PresignError::Malformed("missing expires".into()))?
            .1
            .parse()
            .map_err(|_| PresignError::Malformed("expires is not a number".into()))?;

        let signed_headers = canonical_headers(headers);
        let size: u64 = signed_headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .ok_or_else(|| PresignError::Malformed("missing content-length".into()))?
            .1
            .parse()
            .map_err(|_| PresignError::Malformed("content-length is not a number".into()))?;

        let canonical = canonical_request(&path, &query, &signed_headers);
        match crate::sign::eddsa::verify_did_signature(
            self.identity.did(),
            canonical.as_bytes(),
            &signature,
        ) {
            Ok(()) => {}
            Err(CryptoError::SignatureInvalid) => return Err(PresignError::SignatureInvalid),
            Err(e) => return Err(PresignError::Crypto(e)),
        }

        if expires <= now {
            return Err(PresignError::Expired);
        }
        Ok(VerifiedPut {
            digest,
            size,
            expires,
        })
    }

    fn parse_url(&self, url: &str) -> Result<Url, PresignError> {
        let absolute = if url.starts_with('/') {
            format!("{}{url}", self.public_url)
        } else {
            url.to_string()
        };
        Url::parse(&absolute).map_err(|e| PresignError::Malformed(e.to_string()))
    }
}

/// Lowercases header names and sorts; the order a writer sends headers in
/// must not affect the signature.
fn canonical_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    out.sort();
    out
}

fn canonical_request(
    path: &str,
    query: &[(String, String)],
    signed_headers: &[(String, String)],
) -> String {
    let mut query: Vec<&(String, String)> = query.iter().collect();
    query.sort();
    let query_line = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let header_lines = signed_headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("PUT\n{path}\n{query_line}\n{header_lines}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> PresignAuthority {
        let identity = Arc::new(NodeIdentity::generate().unwrap());
        PresignAuthority::new(identity, "http://node.example:3000/")
    }

    fn digest() -> Digest {
        Digest::sha2_256([0x11; 32])
    }

    #[test]
    fn roundtrip_verifies() {
        let authority = authority();
        let ticket = authority.sign(&digest(), 5, 900, 1_000).unwrap();
        assert_eq!(ticket.expires, 1_900);

        let put = authority.verify(&ticket.url, &ticket.headers, 1_500).unwrap();
        assert_eq!(put.digest, digest());
        assert_eq!(put.size, 5);
        assert_eq!(put.expires, 1_900);
    }

    #[test]
    fn path_and_query_form_verifies() {
        let authority = authority();
        let ticket = authority.sign(&digest(), 5, 900, 1_000).unwrap();
        let path_and_query = ticket
            .url
            .strip_prefix("http://node.example:3000")
            .unwrap()
            .to_string();
        assert!(authority
            .verify(&path_and_query, &ticket.headers, 1_500)
            .is_ok());
    }

    #[test]
    fn tampered_query_fails() {
        let authority = authority();
        let ticket = authority.sign(&digest(), 5, 900, 1_000).unwrap();
        let tampered = ticket.url.replace("expires=1900", "expires=9900");
        assert!(matches!(
            authority.verify(&tampered, &ticket.headers, 1_500),
            Err(PresignError::SignatureInvalid)
        ));
    }

    #[test]
    fn extra_query_parameter_fails() {
        let authority = authority();
        let ticket = authority.sign(&digest(), 5, 900, 1_000).unwrap();
        let tampered = format!("{}&admin=1", ticket.url);
        assert!(matches!(
            authority.verify(&tampered, &ticket.headers, 1_500),
            Err(PresignError::SignatureInvalid)
        ));
    }

    #[test]
    fn tampered_content_length_fails() {
        let authority = authority();
        let ticket = authority.sign(&digest(), 5, 900, 1_000).unwrap();
        let headers = vec![("content-length".to_string(), "6".to_string())];
        assert!(matches!(
            authority.verify(&ticket.url, &headers, 1_500),
            Err(PresignError::SignatureInvalid)
        ));
    }

    #[test]
    fn tampered_path_fails() {
        let authority = authority();
        let ticket = authority.sign(&digest(), 5, 900, 1_000).unwrap();
        let other = Digest::sha2_256([0x22; 32]);
        let tampered = ticket
            .url
            .replace(&digest().to_string(), &other.to_string());
        assert!(matches!(
            authority.verify(&tampered, &ticket.headers, 1_500),
            Err(PresignError::SignatureInvalid)
        ));
    }

    #[test]
    fn expiry_is_enforced_at_verify_time() {
        let authority = authority();
        let ticket = authority.sign(&digest(), 5, 900, 1_000).unwrap();
        assert!(matches!(
            authority.verify(&ticket.url, &ticket.headers, 1_900),
            Err(PresignError::Expired)
        ));
    }

    #[test]
    fn header_order_and_case_do_not_matter() {
        let authority = authority();
        let ticket = authority.sign(&digest(), 5, 900, 1_000).unwrap();
        let headers = vec![("Content-Length".to_string(), "5".to_string())];
        assert!(authority.verify(&ticket.url, &headers, 1_500).is_ok());
    }

    #[test]
    fn non_sha256_digests_are_rejected_at_sign_time() {
        let authority = authority();
        let foreign = Digest::from_bytes(vec![0x1e, 2, 0xAA, 0xBB]).unwrap();
        assert!(matches!(
            authority.sign(&foreign, 5, 900, 1_000),
            Err(PresignError::UnsupportedDigest)
        ));
    }
}
