//! nclink Core Library
//!
//! Link-establishment protocol between a privileged event monitor and the
//! single client that receives its process, image and thread events through
//! shared memory. Provides the size contract checker, buffer mapping, access
//! verification, the link state machine and the control entry point.

pub mod abi;
pub mod config;
pub mod crypto;
pub mod error;
pub mod link;
pub mod protocol;
pub mod shm;
pub mod types;
pub mod verifier;

// Re-export commonly used types
pub use abi::{SizeContract, StructKind};
pub use config::{Config, ConfigLoader, LinkConfig};
pub use crypto::EncryptionConfig;
pub use error::{HardValidationError, LinkError, NcError, NcResult, SharedMemoryError};
pub use link::{Channel, ControlOutcome, LinkController, LinkState};
pub use protocol::{ConnectInfoInput, ConnectInfoOutput, CONNECTION_CODE};
pub use shm::{ClientAddressSpace, SharedMemoryRegion};
pub use types::{ChannelSizeLimit, ClientAddress, VerifierSecret};
pub use verifier::{AccessVerifier, HmacVerifier};
