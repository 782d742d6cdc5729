// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Link state with typed transitions.
//!
//! Implements the link lifecycle: Unlinked → Linked → Unlinked.
//! While linked, all four channels are mapped; while unlinked, none are.

use std::time::Instant;

use serde::Serialize;

use crate::error::LinkError;
use crate::link::Channel;
use crate::shm::{MappedBuffer, MappedView};

/// Link lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    /// No client is linked; no channel may be written.
    Unlinked,

    /// One client is linked and all its channels are mapped.
    Linked,
}

impl LinkState {
    /// Get the state name for log messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unlinked => "Unlinked",
            Self::Linked => "Linked",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: LinkState) -> bool {
        matches!(
            (self, target),
            (Self::Unlinked, Self::Linked) | (Self::Linked, Self::Unlinked)
        )
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One descriptor per channel.
#[derive(Debug, Clone)]
pub struct ChannelSet {
    pub return_buffer: MappedBuffer,
    pub images: MappedBuffer,
    pub processes: MappedBuffer,
    pub threads: MappedBuffer,
}

impl ChannelSet {
    pub fn get(&self, channel: Channel) -> &MappedBuffer {
        match channel {
            Channel::Return => &self.return_buffer,
            Channel::Images => &self.images,
            Channel::Processes => &self.processes,
            Channel::Threads => &self.threads,
        }
    }

    pub fn get_mut(&mut self, channel: Channel) -> &mut MappedBuffer {
        match channel {
            Channel::Return => &mut self.return_buffer,
            Channel::Images => &mut self.images,
            Channel::Processes => &mut self.processes,
            Channel::Threads => &mut self.threads,
        }
    }

    /// The first channel, in link order, that is not mapped.
    pub fn first_unmapped(&self) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|channel| !self.get(*channel).is_mapped())
    }

    pub fn any_mapped(&self) -> bool {
        Channel::ALL
            .into_iter()
            .any(|channel| self.get(channel).is_mapped())
    }

    /// Release every mapping.
    pub fn release_all(&mut self) {
        for channel in Channel::ALL {
            self.get_mut(channel).release();
        }
    }
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self {
            return_buffer: MappedBuffer::unmapped(Channel::Return),
            images: MappedBuffer::unmapped(Channel::Images),
            processes: MappedBuffer::unmapped(Channel::Processes),
            threads: MappedBuffer::unmapped(Channel::Threads),
        }
    }
}

/// The monitor's link state: the link flag plus the committed channels.
///
/// Only the link controller mutates it, and only while holding its lock.
#[derive(Debug)]
pub struct LinkSpaces {
    state: LinkState,
    channels: ChannelSet,
    last_transition: Instant,
    link_count: u64,
}

impl LinkSpaces {
    pub fn new() -> Self {
        Self {
            state: LinkState::Unlinked,
            channels: ChannelSet::default(),
            last_transition: Instant::now(),
            link_count: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_linked(&self) -> bool {
        self.state == LinkState::Linked
    }

    pub fn channel(&self, channel: Channel) -> &MappedBuffer {
        self.channels.get(channel)
    }

    /// View of a channel that may be written, i.e. only while linked.
    pub fn writable(&self, channel: Channel) -> Option<&MappedView> {
        if !self.is_linked() {
            return None;
        }
        self.channels.get(channel).view()
    }

    /// Number of links established since start.
    pub fn link_count(&self) -> u64 {
        self.link_count
    }

    pub fn time_in_current_state(&self) -> std::time::Duration {
        self.last_transition.elapsed()
    }

    fn transition_to(&mut self, target: LinkState) -> Result<(), LinkError> {
        if !self.state.can_transition_to(target) {
            // The only refused transition that can be requested is a second link.
            return Err(LinkError::AlreadyLinked);
        }

        tracing::debug!(from = self.state.name(), to = target.name(), "Link state transition");

        self.state = target;
        self.last_transition = Instant::now();
        Ok(())
    }

    /// Adopt a fully mapped channel set and become linked.
    ///
    /// The channels are recorded before the link flag flips, so nothing sees
    /// a linked state with half-recorded channels. On error, `pending` is
    /// left untouched.
    pub fn commit(&mut self, pending: &mut ChannelSet) -> Result<(), LinkError> {
        if self.is_linked() {
            return Err(LinkError::AlreadyLinked);
        }
        if let Some(channel) = pending.first_unmapped() {
            return Err(LinkError::ChannelMapFailed {
                channel,
                reason: "channel not mapped at commit".to_string(),
            });
        }

        self.channels = std::mem::take(pending);
        self.transition_to(LinkState::Linked)?;
        self.link_count += 1;
        Ok(())
    }

    /// Tear down the current link. Returns whether a link existed.
    pub fn close_links(&mut self) -> bool {
        let was_linked = self.is_linked();
        self.channels.release_all();
        if was_linked {
            // Linked → Unlinked is always valid.
            let _ = self.transition_to(LinkState::Unlinked);
        }
        was_linked
    }
}

impl Default for LinkSpaces {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the link state for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct LinkMetrics {
    pub state: LinkState,
    pub time_in_state_ms: u64,
    pub link_count: u64,
    pub mapped_channels: Vec<Channel>,
}

impl From<&LinkSpaces> for LinkMetrics {
    fn from(spaces: &LinkSpaces) -> Self {
        Self {
            state: spaces.state,
            time_in_state_ms: spaces.time_in_current_state().as_millis() as u64,
            link_count: spaces.link_count,
            mapped_channels: Channel::ALL
                .into_iter()
                .filter(|channel| spaces.channel(*channel).is_mapped())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::abi::{SizeContract, StructKind};
    use crate::shm::{BufferMapper, ClientAddressSpace, SharedMemoryRegion};
    use crate::types::ChannelSizeLimit;

    fn mapped_set() -> ChannelSet {
        let space = ClientAddressSpace::new(ChannelSizeLimit::default());
        let base = space
            .register(SharedMemoryRegion::anonymous("spaces-test", 4096).unwrap())
            .unwrap();
        let mapper = BufferMapper::new(Arc::new(space));
        let size = SizeContract::check(StructKind::ConnectOutput, 4).unwrap();

        let mut set = ChannelSet::default();
        for channel in Channel::ALL {
            *set.get_mut(channel) = mapper.map(channel, base, size);
        }
        set
    }

    #[test]
    fn test_initial_state() {
        let spaces = LinkSpaces::new();
        assert_eq!(spaces.state(), LinkState::Unlinked);
        assert_eq!(spaces.link_count(), 0);
        assert!(spaces.writable(Channel::Images).is_none());
    }

    #[test]
    fn test_transitions() {
        assert!(LinkState::Unlinked.can_transition_to(LinkState::Linked));
        assert!(LinkState::Linked.can_transition_to(LinkState::Unlinked));
        assert!(!LinkState::Linked.can_transition_to(LinkState::Linked));
        assert!(!LinkState::Unlinked.can_transition_to(LinkState::Unlinked));
    }

    #[test]
    fn test_commit_and_close() {
        let mut spaces = LinkSpaces::new();
        let mut pending = mapped_set();

        spaces.commit(&mut pending).unwrap();
        assert!(spaces.is_linked());
        assert!(!pending.any_mapped());
        assert!(spaces.writable(Channel::Threads).is_some());

        assert!(spaces.close_links());
        assert!(!spaces.is_linked());
        assert!(Channel::ALL
            .into_iter()
            .all(|c| !spaces.channel(c).is_mapped()));
        assert!(!spaces.close_links());
    }

    #[test]
    fn test_commit_refuses_second_link() {
        let mut spaces = LinkSpaces::new();
        spaces.commit(&mut mapped_set()).unwrap();

        let mut second = mapped_set();
        assert_eq!(spaces.commit(&mut second), Err(LinkError::AlreadyLinked));
        assert!(second.any_mapped());
        assert_eq!(spaces.link_count(), 1);
    }

    #[test]
    fn test_commit_refuses_partial_set() {
        let mut spaces = LinkSpaces::new();
        let mut partial = mapped_set();
        partial.threads.release();

        assert!(matches!(
            spaces.commit(&mut partial),
            Err(LinkError::ChannelMapFailed {
                channel: Channel::Threads,
                ..
            })
        ));
        assert!(!spaces.is_linked());
    }

    #[test]
    fn test_metrics() {
        let mut spaces = LinkSpaces::new();
        spaces.commit(&mut mapped_set()).unwrap();
        let metrics = LinkMetrics::from(&spaces);
        assert_eq!(metrics.state, LinkState::Linked);
        assert_eq!(metrics.mapped_channels.len(), 4);
    }
}
