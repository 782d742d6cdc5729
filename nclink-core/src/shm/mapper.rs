// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Buffer mapping for client channels.
//!
//! A client hands the monitor bare addresses. The mapper resolves each one
//! against the memory the client actually registered and produces a
//! [`MappedView`]: a bounds-checked capability over exactly the declared
//! number of bytes. The monitor never allocates or frees client memory.

use std::sync::Arc;

use dashmap::DashMap;

use crate::abi::CheckedSize;
use crate::error::SharedMemoryError;
use crate::link::Channel;
use crate::shm::SharedMemoryRegion;
use crate::types::{ChannelSizeLimit, ClientAddress};

/// Bounds-checked view over part of a client region.
#[derive(Clone)]
pub struct MappedView {
    region: Arc<SharedMemoryRegion>,
    offset: usize,
    len: usize,
}

impl MappedView {
    /// Length of the view in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Client address of the first byte.
    pub fn address(&self) -> ClientAddress {
        ClientAddress::new(self.region.base_address().value() + self.offset as u64)
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<(), SharedMemoryError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(SharedMemoryError::OutOfBounds {
                offset,
                len,
                size: self.len,
            }),
        }
    }

    /// Copy `data` into the view at `offset`.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<(), SharedMemoryError> {
        self.check_bounds(offset, data.len())?;

        // SAFETY: self.offset + self.len lies inside the region (checked at
        // mapping time) and offset + data.len() lies inside the view.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.region.as_ptr().add(self.offset + offset),
                data.len(),
            );
        }
        Ok(())
    }

    /// Copy bytes out of the view at `offset` into `out`.
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<(), SharedMemoryError> {
        self.check_bounds(offset, out.len())?;

        // SAFETY: see write_at
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.region.as_ptr().add(self.offset + offset),
                out.as_mut_ptr(),
                out.len(),
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for MappedView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedView")
            .field("region", &self.region.name())
            .field("address", &self.address())
            .field("len", &self.len)
            .finish()
    }
}

/// Memory the monitor can resolve client addresses against.
pub trait ClientMemory: Send + Sync {
    fn map(&self, address: ClientAddress, len: usize) -> Result<MappedView, SharedMemoryError>;
}

/// The set of regions a client has shared with the monitor, keyed by base address.
pub struct ClientAddressSpace {
    regions: DashMap<ClientAddress, Arc<SharedMemoryRegion>>,
    size_limit: ChannelSizeLimit,
}

impl ClientAddressSpace {
    pub fn new(size_limit: ChannelSizeLimit) -> Self {
        Self {
            regions: DashMap::new(),
            size_limit,
        }
    }

    pub fn new_shared(size_limit: ChannelSizeLimit) -> Arc<Self> {
        Arc::new(Self::new(size_limit))
    }

    /// Share a region with the monitor. Returns its base address.
    pub fn register(&self, region: SharedMemoryRegion) -> Result<ClientAddress, SharedMemoryError> {
        if region.size() > self.size_limit.bytes() {
            return Err(SharedMemoryError::MapFailed {
                reason: format!(
                    "Region {} is {} bytes, limit is {}",
                    region.name(),
                    region.size(),
                    self.size_limit
                ),
            });
        }

        let base = region.base_address();
        tracing::debug!(name = %region.name(), base = %base, size = region.size(), "Registered client region");
        self.regions.insert(base, Arc::new(region));
        Ok(base)
    }

    /// Withdraw a region. Views already handed out keep it alive.
    pub fn unregister(&self, base: ClientAddress) -> bool {
        self.regions.remove(&base).is_some()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl ClientMemory for ClientAddressSpace {
    fn map(&self, address: ClientAddress, len: usize) -> Result<MappedView, SharedMemoryError> {
        if address.is_null() {
            return Err(SharedMemoryError::NullAddress);
        }

        let region = self
            .regions
            .iter()
            .find(|entry| entry.value().contains(address, len))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SharedMemoryError::UnmappedRange {
                address: address.value(),
                len,
            })?;

        let offset = (address.value() - region.base_address().value()) as usize;
        Ok(MappedView {
            region,
            offset,
            len,
        })
    }
}

/// Per-channel mapping descriptor.
#[derive(Debug, Clone)]
pub struct MappedBuffer {
    channel: Channel,
    source: ClientAddress,
    size: usize,
    view: Option<MappedView>,
}

impl MappedBuffer {
    /// Descriptor for a channel with nothing mapped.
    pub fn unmapped(channel: Channel) -> Self {
        Self {
            channel,
            source: ClientAddress::NULL,
            size: 0,
            view: None,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn source(&self) -> ClientAddress {
        self.source
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_mapped(&self) -> bool {
        self.view.is_some()
    }

    pub fn view(&self) -> Option<&MappedView> {
        self.view.as_ref()
    }

    /// Drop the view, returning the descriptor to the unmapped state.
    pub fn release(&mut self) {
        if self.view.take().is_some() {
            tracing::debug!(channel = %self.channel, source = %self.source, "Released channel mapping");
        }
    }
}

/// Maps client channels after their sizes passed the contract check.
#[derive(Clone)]
pub struct BufferMapper {
    memory: Arc<dyn ClientMemory>,
}

impl BufferMapper {
    pub fn new(memory: Arc<dyn ClientMemory>) -> Self {
        Self { memory }
    }

    /// Try to map one channel. Failure is recorded in the descriptor, not raised.
    pub fn map(&self, channel: Channel, source: ClientAddress, size: CheckedSize) -> MappedBuffer {
        tracing::debug!(channel = %channel, source = %source, size = size.bytes(), "Mapping channel");

        let view = match self.memory.map(source, size.bytes()) {
            Ok(view) => Some(view),
            Err(e) => {
                tracing::warn!(channel = %channel, source = %source, error = %e, "Channel mapping failed");
                None
            }
        };

        MappedBuffer {
            channel,
            source,
            size: size.bytes(),
            view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{SizeContract, StructKind};

    fn space_with_region() -> (ClientAddressSpace, ClientAddress) {
        let space = ClientAddressSpace::new(ChannelSizeLimit::default());
        let region = SharedMemoryRegion::anonymous("mapper-test", 8192).unwrap();
        let base = space.register(region).unwrap();
        (space, base)
    }

    #[test]
    fn test_map_inside_region() {
        let (space, base) = space_with_region();
        let view = space.map(ClientAddress::new(base.value() + 16), 64).unwrap();
        assert_eq!(view.len(), 64);
        assert_eq!(view.address().value(), base.value() + 16);
    }

    #[test]
    fn test_map_rejects_null_and_outside() {
        let (space, base) = space_with_region();
        assert_eq!(
            space.map(ClientAddress::NULL, 4).unwrap_err(),
            SharedMemoryError::NullAddress
        );
        assert!(matches!(
            space.map(ClientAddress::new(base.value() + 8190), 4),
            Err(SharedMemoryError::UnmappedRange { .. })
        ));
    }

    #[test]
    fn test_view_bounds() {
        let (space, base) = space_with_region();
        let view = space.map(base, 4).unwrap();

        view.write_at(0, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 4];
        view.read_at(0, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);

        assert!(view.write_at(1, &[0; 4]).is_err());
        assert!(view.read_at(usize::MAX, &mut out).is_err());
    }

    #[test]
    fn test_register_respects_limit() {
        let space = ClientAddressSpace::new(ChannelSizeLimit::new(64 * 1024).unwrap());
        let region = SharedMemoryRegion::anonymous("too-big", 128 * 1024).unwrap();
        assert!(space.register(region).is_err());
        assert!(space.is_empty());
    }

    #[test]
    fn test_unregister_keeps_views_alive() {
        let (space, base) = space_with_region();
        let view = space.map(base, 4).unwrap();
        assert!(space.unregister(base));
        view.write_at(0, &[9; 4]).unwrap();
        assert!(space.map(base, 4).is_err());
    }

    #[test]
    fn test_mapper_records_outcome() {
        let (space, base) = space_with_region();
        let mapper = BufferMapper::new(Arc::new(space));
        let size = SizeContract::check(StructKind::ConnectOutput, 4).unwrap();

        let mapped = mapper.map(Channel::Return, base, size);
        assert!(mapped.is_mapped());
        assert_eq!(mapped.size(), 4);

        let mut missing = mapper.map(Channel::Return, ClientAddress::new(0x10), size);
        assert!(!missing.is_mapped());
        missing.release();
        assert!(!missing.is_mapped());
    }
}
