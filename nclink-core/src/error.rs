// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for nclink.
//!
//! Explicit enum error types only. No `Box<dyn Error>`, no `anyhow::Result`.
//! Protocol failures never escape a transaction as fatal conditions; the
//! link controller folds every `LinkError` into the status record it writes
//! back to the client.

use std::path::PathBuf;

use thiserror::Error;

use crate::abi::StructKind;
use crate::link::Channel;

/// Top-level error type for nclink.
#[derive(Debug, Error)]
pub enum NcError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Link Protocol Errors
    // =========================================================================
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    // =========================================================================
    // Shared Memory Errors
    // =========================================================================
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] SharedMemoryError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors reject a configuration before the controller starts.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Channel size out of bounds: {size} bytes (min: {min}, max: {max})")]
    ChannelSizeOutOfBounds { size: usize, min: usize, max: usize },
}

/// Failures of a single link-establishment transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The registration request itself has the wrong length. Nothing is
    /// reported to the client because no return channel exists yet.
    #[error("Registration envelope size mismatch: expected {expected} bytes, got {actual}")]
    EnvelopeSizeMismatch { expected: usize, actual: usize },

    #[error("ABI size mismatch for {kind}: expected {expected} bytes, client declared {declared}")]
    AbiSizeMismatch {
        kind: StructKind,
        expected: usize,
        declared: u32,
    },

    #[error("Channel {channel} could not be mapped: {reason}")]
    ChannelMapFailed { channel: Channel, reason: String },

    #[error("A link is already established")]
    AlreadyLinked,

    #[error("Client was rejected by the access verifier")]
    AccessDenied,

    #[error("Unsupported control request code {code:#010x}")]
    UnsupportedRequest { code: u32 },
}

/// Shared memory and client mapping errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedMemoryError {
    #[error("Failed to create shared memory region: {name} - {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("Failed to map shared memory: {reason}")]
    MapFailed { reason: String },

    #[error("Null client address")]
    NullAddress,

    #[error("Client range {address:#x}+{len} is not inside any registered region")]
    UnmappedRange { address: u64, len: usize },

    #[error("Access out of bounds: offset {offset} + {len} exceeds view of {size} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
}

/// Result type alias using NcError.
pub type NcResult<T> = Result<T, NcError>;
