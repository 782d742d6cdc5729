// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared structure layouts and the size contract checker.
//!
//! Every structure the client and the monitor exchange through shared memory
//! is `#[repr(C)]`; its `size_of` is the compiled-in size a client has to
//! declare. A declared size that disagrees means the two sides were built
//! against different layouts, and the registration is refused.

use std::fmt;
use std::mem::size_of;

use serde::Serialize;

use crate::error::LinkError;
use crate::protocol::ConnectInfoOutput;

/// Number of event slots in each container.
pub const CONTAINER_CAPACITY: usize = 256;

/// Maximum image path length in UTF-16 code units.
pub const MAX_IMAGE_PATH: usize = 260;

/// A process creation or exit.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ProcessEvent {
    pub process_id: u32,
    pub parent_id: u32,
    pub created: u8,
    pub _reserved: [u8; 3],
}

/// A thread creation or exit.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ThreadEvent {
    pub process_id: u32,
    pub thread_id: u32,
    pub created: u8,
    pub _reserved: [u8; 3],
}

/// An image mapped into a process.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImageEvent {
    pub process_id: u32,
    pub _reserved: u32,
    pub image_base: u64,
    pub image_size: u64,
    pub path: [u16; MAX_IMAGE_PATH],
}

/// Fixed-capacity event container living in a client channel.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EventContainer<E> {
    pub write_index: u32,
    pub event_count: u32,
    pub events: [E; CONTAINER_CAPACITY],
}

pub type ProcessContainer = EventContainer<ProcessEvent>;
pub type ThreadContainer = EventContainer<ThreadEvent>;
pub type ImageContainer = EventContainer<ImageEvent>;

/// Structure kinds covered by the size contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StructKind {
    ImageEvent,
    ProcessEvent,
    ThreadEvent,
    ImageContainer,
    ProcessContainer,
    ThreadContainer,
    ConnectOutput,
}

impl StructKind {
    /// Every kind, in the order the client declares them.
    pub const ALL: [StructKind; 7] = [
        Self::ImageEvent,
        Self::ProcessEvent,
        Self::ProcessContainer,
        Self::ImageContainer,
        Self::ThreadContainer,
        Self::ThreadEvent,
        Self::ConnectOutput,
    ];

    /// The compiled-in size for this kind.
    pub const fn expected_size(&self) -> usize {
        match self {
            Self::ImageEvent => size_of::<ImageEvent>(),
            Self::ProcessEvent => size_of::<ProcessEvent>(),
            Self::ThreadEvent => size_of::<ThreadEvent>(),
            Self::ImageContainer => size_of::<ImageContainer>(),
            Self::ProcessContainer => size_of::<ProcessContainer>(),
            Self::ThreadContainer => size_of::<ThreadContainer>(),
            Self::ConnectOutput => ConnectInfoOutput::SIZE,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::ImageEvent => "image event",
            Self::ProcessEvent => "process event",
            Self::ThreadEvent => "thread event",
            Self::ImageContainer => "image container",
            Self::ProcessContainer => "process container",
            Self::ThreadContainer => "thread container",
            Self::ConnectOutput => "connect output",
        }
    }
}

impl fmt::Display for StructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A declared size that passed the contract check.
///
/// Only [`SizeContract::check`] can produce one, and the buffer mapper takes
/// nothing else, so no client length reaches a mapping unchecked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckedSize {
    kind: StructKind,
    bytes: usize,
}

impl CheckedSize {
    pub fn kind(&self) -> StructKind {
        self.kind
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// Size contract checker.
pub struct SizeContract;

impl SizeContract {
    /// Compare a client-declared size against the compiled-in size.
    pub fn check(kind: StructKind, declared: u32) -> Result<CheckedSize, LinkError> {
        let expected = kind.expected_size();
        if declared as usize != expected {
            return Err(LinkError::AbiSizeMismatch {
                kind,
                expected,
                declared,
            });
        }
        Ok(CheckedSize {
            kind,
            bytes: expected,
        })
    }
}

/// One row of the size contract table.
#[derive(Debug, Clone, Serialize)]
pub struct ContractEntry {
    pub kind: StructKind,
    pub size: usize,
}

/// The full size contract, for tooling and client generators.
pub fn contract_table() -> Vec<ContractEntry> {
    StructKind::ALL
        .iter()
        .map(|kind| ContractEntry {
            kind: *kind,
            size: kind.expected_size(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_sizes_follow_layouts() {
        assert_eq!(StructKind::ProcessEvent.expected_size(), 12);
        assert_eq!(StructKind::ThreadEvent.expected_size(), 12);
        assert_eq!(StructKind::ImageEvent.expected_size(), 24 + 2 * MAX_IMAGE_PATH);
        assert_eq!(
            StructKind::ProcessContainer.expected_size(),
            8 + 12 * CONTAINER_CAPACITY
        );
        assert_eq!(StructKind::ConnectOutput.expected_size(), 4);
    }

    #[test]
    fn test_check_accepts_exact_size() {
        let declared = StructKind::ThreadContainer.expected_size() as u32;
        let checked = SizeContract::check(StructKind::ThreadContainer, declared).unwrap();
        assert_eq!(checked.kind(), StructKind::ThreadContainer);
        assert_eq!(checked.bytes(), declared as usize);
    }

    #[test]
    fn test_check_rejects_off_by_one() {
        let expected = StructKind::ImageContainer.expected_size() as u32;
        for declared in [expected - 1, expected + 1, 0] {
            let err = SizeContract::check(StructKind::ImageContainer, declared).unwrap_err();
            assert!(matches!(
                err,
                LinkError::AbiSizeMismatch {
                    kind: StructKind::ImageContainer,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_contract_table_covers_all_kinds() {
        let table = contract_table();
        assert_eq!(table.len(), StructKind::ALL.len());
        assert!(table.iter().all(|e| e.size > 0));
    }
}
