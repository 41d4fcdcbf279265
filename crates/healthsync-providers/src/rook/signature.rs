// ABOUTME: HMAC-SHA256 verification of ROOK webhook signatures over the raw request body
// ABOUTME: Fails closed on missing secret, missing header, or malformed header values
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! ROOK webhook signature verification
//!
//! ROOK signs every webhook with HMAC-SHA256 over the exact request bytes and
//! sends the digest in the `X-ROOK-HASH` header as `sha256=<hex>`. Some
//! environments send the bare hex digest, which is accepted as well.

use healthsync_core::constants::headers::SIGNATURE_PREFIX;
use ring::hmac;
use subtle::ConstantTimeEq;

/// Length of a hex-encoded SHA-256 digest
const HEX_DIGEST_LEN: usize = 64;

/// Webhook signature validation result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureValidation {
    /// Signature is valid
    Valid,
    /// Signature is present but wrong or malformed
    Invalid,
    /// Signature header is missing
    Missing,
    /// No signing secret configured, validation cannot be performed
    NotConfigured,
}

impl SignatureValidation {
    /// Only `Valid` lets a request through
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Validates ROOK webhook signatures
#[derive(Clone)]
pub struct SignatureVerifier {
    key: Option<hmac::Key>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("configured", &self.key.is_some())
            .finish()
    }
}

impl SignatureVerifier {
    /// Create a verifier; an empty or absent secret yields an unconfigured
    /// verifier that rejects everything
    #[must_use]
    pub fn new(secret: Option<&str>) -> Self {
        let key = secret
            .filter(|s| !s.is_empty())
            .map(|s| hmac::Key::new(hmac::HMAC_SHA256, s.as_bytes()));
        Self { key }
    }

    /// Whether a signing secret is configured
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    /// Validate a webhook request signature
    ///
    /// # Arguments
    /// * `signature_header` - Value of the `X-ROOK-HASH` header
    /// * `body` - Raw request body bytes
    #[must_use]
    pub fn validate(&self, signature_header: Option<&str>, body: &[u8]) -> SignatureValidation {
        let Some(key) = &self.key else {
            return SignatureValidation::NotConfigured;
        };
        let Some(header) = signature_header else {
            return SignatureValidation::Missing;
        };

        let provided = header.trim();
        let provided = provided.strip_prefix(SIGNATURE_PREFIX).unwrap_or(provided);
        if provided.len() != HEX_DIGEST_LEN {
            return SignatureValidation::Invalid;
        }
        let provided = provided.to_ascii_lowercase();

        let tag = hmac::sign(key, body);
        let expected = hex::encode(tag.as_ref());

        if provided.as_bytes().ct_eq(expected.as_bytes()).into() {
            SignatureValidation::Valid
        } else {
            SignatureValidation::Invalid
        }
    }

    /// `true` only for a present, well-formed, matching signature
    #[must_use]
    pub fn verify(&self, body: &[u8], signature_header: Option<&str>) -> bool {
        self.validate(signature_header, body).is_valid()
    }

    /// Compute the header value for a body (used by tests and local tooling)
    #[must_use]
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        self.key
            .as_ref()
            .map(|key| format!("{SIGNATURE_PREFIX}{}", hex::encode(hmac::sign(key, body).as_ref())))
    }
}
