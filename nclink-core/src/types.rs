// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Minimum allowed client region size: 64 KB
pub const MIN_CHANNEL_SIZE: usize = 64 * 1024;
/// Maximum allowed client region size: 1 GB
pub const MAX_CHANNEL_SIZE: usize = 1024 * 1024 * 1024;

/// Address of a buffer in the client's address space.
///
/// Opaque to the monitor: it only gains meaning once the buffer mapper
/// resolves it against memory the client registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientAddress(u64);

impl ClientAddress {
    pub const NULL: ClientAddress = ClientAddress(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ClientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for ClientAddress {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Validated upper bound on a single client region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct ChannelSizeLimit(usize);

impl ChannelSizeLimit {
    pub fn new(bytes: usize) -> Result<Self, HardValidationError> {
        if !(MIN_CHANNEL_SIZE..=MAX_CHANNEL_SIZE).contains(&bytes) {
            return Err(HardValidationError::ChannelSizeOutOfBounds {
                size: bytes,
                min: MIN_CHANNEL_SIZE,
                max: MAX_CHANNEL_SIZE,
            });
        }
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> usize {
        self.0
    }
}

impl Default for ChannelSizeLimit {
    fn default() -> Self {
        Self(16 * 1024 * 1024)
    }
}

impl fmt::Display for ChannelSizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

impl TryFrom<usize> for ChannelSizeLimit {
    type Error = HardValidationError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChannelSizeLimit> for usize {
    fn from(limit: ChannelSizeLimit) -> Self {
        limit.0
    }
}

/// Secret shared with the legitimate client, used to authenticate requests.
/// At least 16 bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifierSecret(Vec<u8>);

impl VerifierSecret {
    pub const MIN_LEN: usize = 16;

    pub fn new(bytes: Vec<u8>) -> Result<Self, HardValidationError> {
        if bytes.len() < Self::MIN_LEN {
            return Err(HardValidationError::InvalidFieldValue {
                field: "verifier_secret",
                value: format!("{} bytes", bytes.len()),
                reason: format!("Secret must be at least {} bytes", Self::MIN_LEN),
            });
        }
        Ok(Self(bytes))
    }

    /// Parse a hex-encoded secret.
    pub fn from_hex(text: &str) -> Result<Self, HardValidationError> {
        let bytes = hex::decode(text.trim()).map_err(|e| HardValidationError::InvalidFieldValue {
            field: "verifier_secret",
            value: "<redacted>".to_string(),
            reason: format!("Not valid hex: {}", e),
        })?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// Never print key material.
impl fmt::Debug for VerifierSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifierSecret({} bytes)", self.0.len())
    }
}
