// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Link state and the link control entry point.
//!
//! A link associates the monitor with one client through four mapped
//! channels. It is established by a single all-or-nothing transaction.

mod controller;
mod spaces;

use std::fmt;

use serde::Serialize;

pub use controller::{ControlOutcome, LinkController};
pub use spaces::{ChannelSet, LinkMetrics, LinkSpaces, LinkState};

/// The shared-memory channels making up a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Receives the status record of the registration.
    Return,
    Images,
    Processes,
    Threads,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Self::Return,
        Self::Images,
        Self::Processes,
        Self::Threads,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Return => "Return",
            Self::Images => "Images",
            Self::Processes => "Processes",
            Self::Threads => "Threads",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
