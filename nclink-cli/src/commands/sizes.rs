// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `nclink sizes` command - Print the structure size contract.

use nclink_core::abi::contract_table;
use nclink_core::ConnectInfoInput;

pub async fn execute(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let table = contract_table();

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    println!("{:<20} {:>10}", "STRUCTURE", "BYTES");
    for entry in &table {
        println!("{:<20} {:>10}", entry.kind.name(), entry.size);
    }
    println!();
    println!("Registration request: {} bytes", ConnectInfoInput::SIZE);
    Ok(())
}
