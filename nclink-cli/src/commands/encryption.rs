// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `nclink encryption` command - Show the build's encryption settings.

use nclink_core::EncryptionConfig;

pub async fn execute() -> Result<(), Box<dyn std::error::Error>> {
    let config = EncryptionConfig::build();

    println!("Encryption passes:  {}", config.passes);
    println!(
        "Routines:           {}",
        if config.inline {
            "inlined"
        } else {
            "out of line"
        }
    );
    println!("Key length:         {} bytes", config.key.len());
    Ok(())
}
