// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `nclink handshake` command - Run a registration in-process.
//!
//! Plays both sides: allocates the client's channels in anonymous shared
//! memory, sends the registration through the control entry point and reads
//! the status record back from the client's return buffer.

use std::sync::Arc;

use thiserror::Error;

use nclink_core::shm::ClientMemory;
use nclink_core::{
    ChannelSizeLimit, ClientAddress, ClientAddressSpace, ConfigLoader, ConnectInfoInput,
    ConnectInfoOutput, ControlOutcome, HmacVerifier, LinkController, LinkError,
    SharedMemoryError, SharedMemoryRegion, StructKind, VerifierSecret, CONNECTION_CODE,
};

/// Secret used when no configuration file is given.
const DEMO_SECRET_HEX: &str = "6e4a7596675167186517743a02449901";

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Registration rejected before a status could be reported: {0}")]
    Rejected(#[from] LinkError),

    #[error("Client memory error: {0}")]
    Memory(#[from] SharedMemoryError),
}

pub struct HandshakeOptions {
    pub config: Option<String>,
    pub corrupt: Option<StructKind>,
    pub deny: bool,
    pub twice: bool,
}

pub async fn execute(options: HandshakeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let (secret, limit) = match &options.config {
        Some(path) => {
            let config = ConfigLoader::load_file(path)?;
            (config.link.verifier_secret, config.link.max_channel_size)
        }
        None => (
            VerifierSecret::from_hex(DEMO_SECRET_HEX)?,
            ChannelSizeLimit::default(),
        ),
    };

    let space = ClientAddressSpace::new_shared(limit);
    let controller = LinkController::new(space.clone(), Arc::new(HmacVerifier::new(secret.clone())));

    let request = build_request(&space, &secret, &options)?;
    tracing::info!(
        corrupt = ?options.corrupt,
        deny = options.deny,
        "Sending registration"
    );

    let attempts = if options.twice { 2 } else { 1 };
    for attempt in 1..=attempts {
        let outcome = controller.handle_control(CONNECTION_CODE, &request.encode());
        report(attempt, &outcome, &space, request.return_info)?;
    }

    println!();
    println!("Link state:");
    println!("{}", serde_json::to_string_pretty(&controller.metrics())?);

    controller.close_links();
    Ok(())
}

fn build_request(
    space: &ClientAddressSpace,
    secret: &VerifierSecret,
    options: &HandshakeOptions,
) -> Result<ConnectInfoInput, HandshakeError> {
    let register = |label: &str, size: usize| -> Result<ClientAddress, HandshakeError> {
        let region = SharedMemoryRegion::anonymous(label, size.max(SharedMemoryRegion::MIN_SIZE))?;
        Ok(space.register(region)?)
    };

    let images = register("images", StructKind::ImageContainer.expected_size())?;
    let processes = register("processes", StructKind::ProcessContainer.expected_size())?;
    let threads = register("threads", StructKind::ThreadContainer.expected_size())?;
    let ret = register("return", SharedMemoryRegion::MIN_SIZE)?;

    let mut request = ConnectInfoInput::new(images, processes, threads, ret);
    if let Some(kind) = options.corrupt {
        *request.declared_size_mut(kind) += 1;
    }

    if options.deny {
        request.sign(b"an unrelated secret the monitor does not know");
    } else {
        request.sign(secret.as_bytes());
    }
    Ok(request)
}

fn report(
    attempt: u32,
    outcome: &ControlOutcome,
    space: &ClientAddressSpace,
    return_info: ClientAddress,
) -> Result<(), HandshakeError> {
    println!("Attempt {}:", attempt);

    match outcome {
        ControlOutcome::Rejected(e) => return Err(HandshakeError::Rejected(e.clone())),
        ControlOutcome::Completed {
            delivered: false, ..
        } => {
            println!("  ✗ No status record delivered (return channel not mapped)");
        }
        ControlOutcome::Completed { .. } => {
            let view = space.map(return_info, ConnectInfoOutput::SIZE)?;
            let mut raw = [0u8; ConnectInfoOutput::SIZE];
            view.read_at(0, &mut raw)?;
            let status = ConnectInfoOutput::decode(raw);

            let mark = if status.success { "✓" } else { "✗" };
            println!(
                "  {} success={} blocked={} access_denied={} size_mismatch={}",
                mark,
                status.success as u8,
                status.blocked as u8,
                status.access_denied as u8,
                status.size_mismatch as u8
            );
        }
    }
    Ok(())
}
