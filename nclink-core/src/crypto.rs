// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Build-time configuration handed to the channel encryption routines.
//!
//! Nothing here is negotiated with the client or changeable at runtime.

use serde::Serialize;

/// Number of encryption passes.
pub const ENC_PASSES: u32 = 3;

/// Private key used by the encryption routines.
pub const ENC_PRIVATE_KEY: [u8; 16] = [
    0x6e, 0x4A, 0x75, 0x96, 0x67, 0x51, 0x67, 0x18, 0x65, 0x17, 0x74, 0xF3, 0x3a, 0x02, 0x44, 0x99,
];

/// Whether encryption routines are forced inline (`optimize-encryption`)
/// or kept as separate out-of-line procedures.
pub const INLINE_ENCRYPTION: bool = cfg!(feature = "optimize-encryption");

/// Declare an encryption routine, inlined or out of line per the build.
///
/// ```
/// nclink_core::enc_fn! {
///     pub fn xor_pass(data: &mut [u8], key: u8) {
///         data.iter_mut().for_each(|b| *b ^= key);
///     }
/// }
/// let mut data = [1u8, 2, 3];
/// xor_pass(&mut data, 0xff);
/// assert_eq!(data, [0xfe, 0xfd, 0xfc]);
/// ```
#[cfg(feature = "optimize-encryption")]
#[macro_export]
macro_rules! enc_fn {
    ($(#[$meta:meta])* $vis:vis fn $name:ident $($rest:tt)*) => {
        $(#[$meta])*
        #[inline(always)]
        $vis fn $name $($rest)*
    };
}

/// Declare an encryption routine, inlined or out of line per the build.
#[cfg(not(feature = "optimize-encryption"))]
#[macro_export]
macro_rules! enc_fn {
    ($(#[$meta:meta])* $vis:vis fn $name:ident $($rest:tt)*) => {
        $(#[$meta])*
        #[inline(never)]
        $vis fn $name $($rest)*
    };
}

/// The encryption configuration of this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncryptionConfig {
    pub passes: u32,
    #[serde(skip)]
    pub key: [u8; 16],
    pub inline: bool,
}

impl EncryptionConfig {
    pub const BUILD: EncryptionConfig = EncryptionConfig {
        passes: ENC_PASSES,
        key: ENC_PRIVATE_KEY,
        inline: INLINE_ENCRYPTION,
    };

    pub fn build() -> &'static EncryptionConfig {
        &Self::BUILD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config() {
        let config = EncryptionConfig::build();
        assert_eq!(config.passes, 3);
        assert_eq!(config.key[0], 0x6e);
        assert_eq!(config.key[15], 0x99);
        assert_eq!(config.inline, cfg!(feature = "optimize-encryption"));
    }

    crate::enc_fn! {
        fn rotate_pass(data: &mut [u8]) {
            data.iter_mut().for_each(|b| *b = b.rotate_left(1));
        }
    }

    #[test]
    fn test_enc_fn_declares_callable_routine() {
        let mut data = [0x80u8, 0x01];
        for _ in 0..ENC_PASSES {
            rotate_pass(&mut data);
        }
        assert_eq!(data, [0x04, 0x08]);
    }

    #[test]
    fn test_serialized_config_hides_key() {
        let yaml = serde_yaml::to_string(EncryptionConfig::build()).unwrap();
        assert!(yaml.contains("passes: 3"));
        assert!(!yaml.contains("key"));
    }
}
