// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Access verification for registering clients.
//!
//! The link controller treats the verifier as an oracle: it hands over the
//! whole registration request and gets back accept or reject.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::protocol::{ConnectInfoInput, AUTH_TAG_LEN};
use crate::types::VerifierSecret;

type HmacSha256 = Hmac<Sha256>;

/// Decides whether a client may link.
pub trait AccessVerifier: Send + Sync {
    fn verify(&self, request: &ConnectInfoInput) -> bool;
}

impl<F> AccessVerifier for F
where
    F: Fn(&ConnectInfoInput) -> bool + Send + Sync,
{
    fn verify(&self, request: &ConnectInfoInput) -> bool {
        self(request)
    }
}

/// HMAC-SHA256 of `message` under `secret`.
pub fn compute_tag(secret: &[u8], message: &[u8]) -> [u8; AUTH_TAG_LEN] {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(message);

    let mut tag = [0u8; AUTH_TAG_LEN];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    tag
}

/// Accepts requests whose authentication tag matches the shared secret.
pub struct HmacVerifier {
    secret: VerifierSecret,
}

impl HmacVerifier {
    pub fn new(secret: VerifierSecret) -> Self {
        Self { secret }
    }
}

impl AccessVerifier for HmacVerifier {
    fn verify(&self, request: &ConnectInfoInput) -> bool {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return false;
        };
        mac.update(&request.signed_bytes());
        let accepted = mac.verify_slice(&request.auth_tag).is_ok();

        tracing::debug!(accepted = accepted, "HMAC verification");
        accepted
    }
}
