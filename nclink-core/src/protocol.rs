// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Registration request and status record wire formats.
//!
//! Both records are fixed-size and little-endian. The request arrives as the
//! input of a control call; the status record is copied into the client's
//! return channel.

use serde::Serialize;

use crate::abi::StructKind;
use crate::error::LinkError;
use crate::types::ClientAddress;
use crate::verifier;

/// Control code requesting link establishment.
pub const CONNECTION_CODE: u32 = 0x0022_2000;

/// Length of the authentication tag carried by a request.
pub const AUTH_TAG_LEN: usize = 32;

/// Offset of the authentication tag; everything before it is signed.
const AUTH_TAG_OFFSET: usize = 64;

/// Client registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfoInput {
    pub image_event_size: u32,
    pub process_event_size: u32,
    pub process_container_size: u32,
    pub image_container_size: u32,
    pub thread_container_size: u32,
    pub thread_event_size: u32,
    pub return_size: u32,
    pub image_container: ClientAddress,
    pub process_container: ClientAddress,
    pub thread_container: ClientAddress,
    pub return_info: ClientAddress,
    pub auth_tag: [u8; AUTH_TAG_LEN],
}

impl ConnectInfoInput {
    /// Encoded size of a request.
    pub const SIZE: usize = AUTH_TAG_OFFSET + AUTH_TAG_LEN;

    /// Build a request declaring this build's sizes for every structure.
    pub fn new(
        image_container: ClientAddress,
        process_container: ClientAddress,
        thread_container: ClientAddress,
        return_info: ClientAddress,
    ) -> Self {
        let size = |kind: StructKind| kind.expected_size() as u32;
        Self {
            image_event_size: size(StructKind::ImageEvent),
            process_event_size: size(StructKind::ProcessEvent),
            process_container_size: size(StructKind::ProcessContainer),
            image_container_size: size(StructKind::ImageContainer),
            thread_container_size: size(StructKind::ThreadContainer),
            thread_event_size: size(StructKind::ThreadEvent),
            return_size: size(StructKind::ConnectOutput),
            image_container,
            process_container,
            thread_container,
            return_info,
            auth_tag: [0; AUTH_TAG_LEN],
        }
    }

    /// Mutable access to the declared size of one kind.
    pub fn declared_size_mut(&mut self, kind: StructKind) -> &mut u32 {
        match kind {
            StructKind::ImageEvent => &mut self.image_event_size,
            StructKind::ProcessEvent => &mut self.process_event_size,
            StructKind::ThreadEvent => &mut self.thread_event_size,
            StructKind::ImageContainer => &mut self.image_container_size,
            StructKind::ProcessContainer => &mut self.process_container_size,
            StructKind::ThreadContainer => &mut self.thread_container_size,
            StructKind::ConnectOutput => &mut self.return_size,
        }
    }

    /// Decode a request, rejecting any envelope that is not exactly [`Self::SIZE`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, LinkError> {
        if bytes.len() != Self::SIZE {
            return Err(LinkError::EnvelopeSizeMismatch {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let u32_at = |offset: usize| {
            u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };
        let addr_at = |offset: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[offset..offset + 8]);
            ClientAddress::new(u64::from_le_bytes(raw))
        };

        let mut auth_tag = [0u8; AUTH_TAG_LEN];
        auth_tag.copy_from_slice(&bytes[AUTH_TAG_OFFSET..]);

        Ok(Self {
            image_event_size: u32_at(0),
            process_event_size: u32_at(4),
            process_container_size: u32_at(8),
            image_container_size: u32_at(12),
            thread_container_size: u32_at(16),
            thread_event_size: u32_at(20),
            return_size: u32_at(24),
            image_container: addr_at(32),
            process_container: addr_at(40),
            thread_container: addr_at(48),
            return_info: addr_at(56),
            auth_tag,
        })
    }

    /// Encode a request.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..AUTH_TAG_OFFSET].copy_from_slice(&self.signed_bytes());
        out[AUTH_TAG_OFFSET..].copy_from_slice(&self.auth_tag);
        out
    }

    /// The bytes covered by the authentication tag.
    pub fn signed_bytes(&self) -> [u8; AUTH_TAG_OFFSET] {
        let mut out = [0u8; AUTH_TAG_OFFSET];
        let sizes = [
            self.image_event_size,
            self.process_event_size,
            self.process_container_size,
            self.image_container_size,
            self.thread_container_size,
            self.thread_event_size,
            self.return_size,
            0,
        ];
        for (i, size) in sizes.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&size.to_le_bytes());
        }
        let addresses = [
            self.image_container,
            self.process_container,
            self.thread_container,
            self.return_info,
        ];
        for (i, addr) in addresses.iter().enumerate() {
            let offset = 32 + i * 8;
            out[offset..offset + 8].copy_from_slice(&addr.value().to_le_bytes());
        }
        out
    }

    /// Fill in the authentication tag using the shared secret.
    pub fn sign(&mut self, secret: &[u8]) {
        self.auth_tag = verifier::compute_tag(secret, &self.signed_bytes());
    }
}

/// Status record delivered to the client's return channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectInfoOutput {
    pub success: bool,
    pub blocked: bool,
    pub access_denied: bool,
    pub size_mismatch: bool,
}

impl ConnectInfoOutput {
    /// Encoded size of a status record.
    pub const SIZE: usize = 4;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        [
            self.success as u8,
            self.blocked as u8,
            self.access_denied as u8,
            self.size_mismatch as u8,
        ]
    }

    pub fn decode(bytes: [u8; Self::SIZE]) -> Self {
        Self {
            success: bytes[0] != 0,
            blocked: bytes[1] != 0,
            access_denied: bytes[2] != 0,
            size_mismatch: bytes[3] != 0,
        }
    }

    /// Record the outcome of a failed transaction.
    pub fn record_failure(&mut self, err: &LinkError) {
        self.success = false;
        match err {
            LinkError::AlreadyLinked => self.blocked = true,
            LinkError::AccessDenied => self.access_denied = true,
            LinkError::AbiSizeMismatch { .. } | LinkError::ChannelMapFailed { .. } => {
                self.size_mismatch = true
            }
            LinkError::EnvelopeSizeMismatch { .. } | LinkError::UnsupportedRequest { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConnectInfoInput {
        ConnectInfoInput::new(
            ClientAddress::new(0x1000),
            ClientAddress::new(0x2000),
            ClientAddress::new(0x3000),
            ClientAddress::new(0x4000),
        )
    }

    #[test]
    fn test_encode_layout() {
        let bytes = sample().encode();
        assert_eq!(bytes.len(), 96);
        assert_eq!(&bytes[24..28], &4u32.to_le_bytes());
        assert_eq!(&bytes[28..32], &[0, 0, 0, 0]);
        assert_eq!(&bytes[56..64], &0x4000u64.to_le_bytes());
    }

    #[test]
    fn test_decode_preserves_fields() {
        let mut request = sample();
        request.sign(b"0123456789abcdef");
        let decoded = ConnectInfoInput::decode(&request.encode()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_decode_rejects_wrong_envelope() {
        let bytes = sample().encode();
        for len in [0, 95, 97] {
            let mut buf = bytes.to_vec();
            buf.resize(len, 0);
            assert_eq!(
                ConnectInfoInput::decode(&buf),
                Err(LinkError::EnvelopeSizeMismatch {
                    expected: 96,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn test_output_flags() {
        let mut out = ConnectInfoOutput::default();
        out.record_failure(&LinkError::AlreadyLinked);
        assert_eq!(out.encode(), [0, 1, 0, 0]);

        let out = ConnectInfoOutput::decode([1, 0, 0, 0]);
        assert!(out.success && !out.blocked && !out.access_denied && !out.size_mismatch);
    }
}
