// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared memory channels.
//!
//! Client-owned shared memory regions and the bounds-checked views the
//! monitor maps over them.

mod mapper;
mod region;

pub use mapper::{BufferMapper, ClientAddressSpace, ClientMemory, MappedBuffer, MappedView};
pub use region::SharedMemoryRegion;
