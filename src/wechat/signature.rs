//! WeChat URL-verification handshake.
//!
//! During endpoint setup the platform sends a challenge request carrying
//! `signature = sha1(concat(sort(token, timestamp, nonce)))` and expects
//! the raw `echostr` back on success. The token is a shared secret known
//! only to this service and the platform.

use sha1::{Digest, Sha1};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("missing handshake parameter: {0}")]
    MissingParameter(&'static str),
    #[error("handshake signature mismatch")]
    SignatureMismatch,
}

/// One URL-verification request, unpacked from the query string.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub echostr: String,
}

impl VerificationRequest {
    /// Build from optional query parameters, rejecting absent ones.
    pub fn from_parts(
        signature: Option<String>,
        timestamp: Option<String>,
        nonce: Option<String>,
        echostr: Option<String>,
    ) -> Result<Self, HandshakeError> {
        Ok(Self {
            signature: signature.ok_or(HandshakeError::MissingParameter("signature"))?,
            timestamp: timestamp.ok_or(HandshakeError::MissingParameter("timestamp"))?,
            nonce: nonce.ok_or(HandshakeError::MissingParameter("nonce"))?,
            echostr: echostr.ok_or(HandshakeError::MissingParameter("echostr"))?,
        })
    }

    /// Check the supplied signature against the shared token.
    ///
    /// The comparison is constant-time and case-sensitive on the hex
    /// digest; the computed value never leaves this function.
    pub fn verify(&self, token: &str) -> Result<(), HandshakeError> {
        let expected = compute_signature(token, &self.timestamp, &self.nonce);
        if constant_time_eq(&expected, &self.signature) {
            Ok(())
        } else {
            Err(HandshakeError::SignatureMismatch)
        }
    }
}

/// Digest over the shared token and the two volatile values:
/// lexicographic sort, bare concatenation, SHA-1, lowercase hex.
pub fn compute_signature(token: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [token, timestamp, nonce];
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Constant-time string comparison, resistant to length and content
/// timing probes.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();

    let len_diff = a.len() ^ b.len();

    // XOR each byte, padding the shorter input with zeros.
    // Iterates over max(a.len(), b.len()) to avoid timing differences.
    let max_len = a.len().max(b.len());
    let mut byte_diff = 0u8;
    for i in 0..max_len {
        let x = *a.get(i).unwrap_or(&0);
        let y = *b.get(i).unwrap_or(&0);
        byte_diff |= x ^ y;
    }

    len_diff == 0 && byte_diff == 0
}
