// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Link control entry point and the establish-link transaction.
//!
//! Every control request is handled to completion. For the connection code
//! the controller validates, verifies and maps the client's channels, and
//! either commits all four or none. The outcome is written back into the
//! client's return channel rather than returned to the client directly.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::abi::{SizeContract, StructKind};
use crate::error::LinkError;
use crate::link::{Channel, ChannelSet, LinkMetrics, LinkSpaces};
use crate::protocol::{ConnectInfoInput, ConnectInfoOutput, CONNECTION_CODE};
use crate::shm::{BufferMapper, ClientMemory, MappedView};
use crate::verifier::AccessVerifier;

/// How a control request ended, as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The request was handled and a status record produced.
    Completed {
        status: ConnectInfoOutput,
        /// Whether the record reached the client's return channel.
        delivered: bool,
    },
    /// The request was refused before any channel existed to report through.
    Rejected(LinkError),
}

impl ControlOutcome {
    pub fn status(&self) -> Option<ConnectInfoOutput> {
        match self {
            Self::Completed { status, .. } => Some(*status),
            Self::Rejected(_) => None,
        }
    }
}

/// Owns the link state and serializes every transaction on it.
pub struct LinkController {
    spaces: Mutex<LinkSpaces>,
    mapper: BufferMapper,
    verifier: Arc<dyn AccessVerifier>,
}

impl LinkController {
    pub fn new(memory: Arc<dyn ClientMemory>, verifier: Arc<dyn AccessVerifier>) -> Self {
        Self {
            spaces: Mutex::new(LinkSpaces::new()),
            mapper: BufferMapper::new(memory),
            verifier,
        }
    }

    pub fn new_shared(
        memory: Arc<dyn ClientMemory>,
        verifier: Arc<dyn AccessVerifier>,
    ) -> Arc<Self> {
        Arc::new(Self::new(memory, verifier))
    }

    fn lock_spaces(&self) -> MutexGuard<'_, LinkSpaces> {
        // A panic mid-transaction leaves no partial commit behind, so the
        // state is still consistent.
        self.spaces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle one control request.
    pub fn handle_control(&self, code: u32, input: &[u8]) -> ControlOutcome {
        tracing::info!(code = code, len = input.len(), "Control request");

        let outcome = match code {
            CONNECTION_CODE => self.establish_link(input),
            _ => {
                tracing::warn!(
                    code = code,
                    "Control request type not supported, or an old code has been used"
                );
                ControlOutcome::Rejected(LinkError::UnsupportedRequest { code })
            }
        };

        tracing::debug!(code = code, "Completed control request");
        outcome
    }

    /// Run the establish-link transaction.
    pub fn establish_link(&self, input: &[u8]) -> ControlOutcome {
        let request = match ConnectInfoInput::decode(input) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed registration request");
                return ControlOutcome::Rejected(e);
            }
        };

        let mut spaces = self.lock_spaces();
        let mut pending = ChannelSet::default();

        let negotiated = self.negotiate(&spaces, &request, &mut pending);
        let return_view = pending.return_buffer.view().cloned();
        let result = negotiated.and_then(|()| spaces.commit(&mut pending));

        let mut status = ConnectInfoOutput::default();
        match &result {
            Ok(()) => {
                status.success = true;
                tracing::info!(link_count = spaces.link_count(), "Link established");
            }
            Err(e) => {
                status.record_failure(e);
                Self::rollback(&mut pending, e);
            }
        }
        let delivered = Self::write_status(return_view.as_ref(), &status);
        ControlOutcome::Completed { status, delivered }
    }

    /// Validate, verify and map, in protocol order. Mappings made along the
    /// way accumulate in `pending`; nothing touches `spaces`.
    fn negotiate(
        &self,
        spaces: &LinkSpaces,
        request: &ConnectInfoInput,
        pending: &mut ChannelSet,
    ) -> Result<(), LinkError> {
        let return_size = SizeContract::check(StructKind::ConnectOutput, request.return_size)?;
        pending.return_buffer = self
            .mapper
            .map(Channel::Return, request.return_info, return_size);

        if spaces.is_linked() {
            tracing::warn!("Link already established, refusing registration");
            return Err(LinkError::AlreadyLinked);
        }

        SizeContract::check(StructKind::ImageEvent, request.image_event_size)?;
        SizeContract::check(StructKind::ProcessEvent, request.process_event_size)?;
        let processes =
            SizeContract::check(StructKind::ProcessContainer, request.process_container_size)?;
        let images = SizeContract::check(StructKind::ImageContainer, request.image_container_size)?;
        let threads =
            SizeContract::check(StructKind::ThreadContainer, request.thread_container_size)?;
        SizeContract::check(StructKind::ThreadEvent, request.thread_event_size)?;

        if !self.verifier.verify(request) {
            tracing::warn!("Could not validate client");
            return Err(LinkError::AccessDenied);
        }
        tracing::info!("Successfully validated client");

        pending.images = self
            .mapper
            .map(Channel::Images, request.image_container, images);
        pending.processes =
            self.mapper
                .map(Channel::Processes, request.process_container, processes);
        pending.threads = self
            .mapper
            .map(Channel::Threads, request.thread_container, threads);

        match pending.first_unmapped() {
            Some(channel) => Err(LinkError::ChannelMapFailed {
                channel,
                reason: format!("could not map {} bytes", pending.get(channel).size()),
            }),
            None => Ok(()),
        }
    }

    /// Release everything a failed transaction mapped.
    fn rollback(pending: &mut ChannelSet, cause: &LinkError) {
        if pending.any_mapped() {
            tracing::warn!(cause = %cause, "Registration failed, closing partial mappings");
        } else {
            tracing::warn!(cause = %cause, "Registration failed");
        }
        pending.release_all();
    }

    /// Copy the status record into the client's return channel, if it was mapped.
    fn write_status(view: Option<&MappedView>, status: &ConnectInfoOutput) -> bool {
        let Some(view) = view else {
            tracing::debug!("Return channel not mapped, status record dropped");
            return false;
        };

        tracing::trace!("Writing return information");
        match view.write_at(0, &status.encode()) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to write status record");
                false
            }
        }
    }

    /// Tear down the current link, e.g. when the client exits.
    pub fn close_links(&self) -> bool {
        let closed = self.lock_spaces().close_links();
        if closed {
            tracing::info!("Link closed");
        }
        closed
    }

    pub fn is_linked(&self) -> bool {
        self.lock_spaces().is_linked()
    }

    /// Run `f` against a channel of the current link. `None` while unlinked.
    pub fn with_channel<R>(&self, channel: Channel, f: impl FnOnce(&MappedView) -> R) -> Option<R> {
        let spaces = self.lock_spaces();
        spaces.writable(channel).map(f)
    }

    pub fn metrics(&self) -> LinkMetrics {
        LinkMetrics::from(&*self.lock_spaces())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::{ClientAddressSpace, SharedMemoryRegion};
    use crate::types::{ChannelSizeLimit, ClientAddress};

    fn accept_all() -> Arc<dyn AccessVerifier> {
        Arc::new(|_: &ConnectInfoInput| true)
    }

    fn client_request(space: &ClientAddressSpace) -> ConnectInfoInput {
        let register = |label: &str, size: usize| {
            space
                .register(SharedMemoryRegion::anonymous(label, size.max(4096)).unwrap())
                .unwrap()
        };
        let images = register("images", StructKind::ImageContainer.expected_size());
        let processes = register("processes", StructKind::ProcessContainer.expected_size());
        let threads = register("threads", StructKind::ThreadContainer.expected_size());
        let ret = register("return", 4096);
        ConnectInfoInput::new(images, processes, threads, ret)
    }

    fn controller(verifier: Arc<dyn AccessVerifier>) -> (LinkController, Arc<ClientAddressSpace>) {
        let space = ClientAddressSpace::new_shared(ChannelSizeLimit::default());
        (LinkController::new(space.clone(), verifier), space)
    }

    #[test]
    fn test_unsupported_code_is_noop() {
        let (ctl, space) = controller(accept_all());
        let request = client_request(&space);

        let outcome = ctl.handle_control(0xdead, &request.encode());
        assert_eq!(
            outcome,
            ControlOutcome::Rejected(LinkError::UnsupportedRequest { code: 0xdead })
        );
        assert!(!ctl.is_linked());
    }

    #[test]
    fn test_envelope_mismatch_rejected() {
        let (ctl, space) = controller(accept_all());
        let bytes = client_request(&space).encode();

        let outcome = ctl.handle_control(CONNECTION_CODE, &bytes[..95]);
        assert!(matches!(
            outcome,
            ControlOutcome::Rejected(LinkError::EnvelopeSizeMismatch { .. })
        ));
        assert!(!ctl.is_linked());
    }

    #[test]
    fn test_return_size_mismatch_not_delivered() {
        let (ctl, space) = controller(accept_all());
        let mut request = client_request(&space);
        request.return_size = 8;

        let outcome = ctl.handle_control(CONNECTION_CODE, &request.encode());
        match outcome {
            ControlOutcome::Completed { status, delivered } => {
                assert!(status.size_mismatch);
                assert!(!status.success);
                assert!(!delivered);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_verifier_not_consulted_after_size_mismatch() {
        let consulted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = consulted.clone();
        let verifier: Arc<dyn AccessVerifier> = Arc::new(move |_: &ConnectInfoInput| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            true
        });
        let (ctl, space) = controller(verifier);

        let mut request = client_request(&space);
        request.thread_event_size += 1;
        ctl.handle_control(CONNECTION_CODE, &request.encode());
        assert_eq!(consulted.load(std::sync::atomic::Ordering::SeqCst), 0);

        let request = client_request(&space);
        ctl.handle_control(CONNECTION_CODE, &request.encode());
        assert_eq!(consulted.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unmapped_container_rolls_back() {
        let (ctl, space) = controller(accept_all());
        let mut request = client_request(&space);
        request.thread_container = ClientAddress::NULL;

        let status = ctl
            .handle_control(CONNECTION_CODE, &request.encode())
            .status()
            .unwrap();
        assert!(status.size_mismatch);
        assert!(!ctl.is_linked());
        assert!(ctl.metrics().mapped_channels.is_empty());
    }

    #[test]
    fn test_unmapped_return_links_nothing() {
        let (ctl, space) = controller(accept_all());
        let mut request = client_request(&space);
        request.return_info = ClientAddress::new(0x10);

        let outcome = ctl.handle_control(CONNECTION_CODE, &request.encode());
        assert!(matches!(
            outcome,
            ControlOutcome::Completed {
                delivered: false,
                ..
            }
        ));
        assert!(!ctl.is_linked());
    }

    #[test]
    fn test_with_channel_only_while_linked() {
        let (ctl, space) = controller(accept_all());
        assert!(ctl.with_channel(Channel::Images, |v| v.len()).is_none());

        let request = client_request(&space);
        ctl.handle_control(CONNECTION_CODE, &request.encode());
        assert_eq!(
            ctl.with_channel(Channel::Images, |v| v.len()),
            Some(StructKind::ImageContainer.expected_size())
        );

        assert!(ctl.close_links());
        assert!(ctl.with_channel(Channel::Images, |v| v.len()).is_none());
    }
}
