//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use evm_call_resolver as ecr;
use evm_call_resolver::{
    bytecode,
    extractor::{
        contract::{CodeLayout, Contract},
        InitialExtractor,
    },
    opcode::{Opcode, PushN},
    resolver,
};

/// Constructs a new extractor to analyze the hex-encoded (with or without the
/// `0x` prefix) contract bytecode provided in `code`.
///
/// It uses the default configuration for the resolvers.
#[allow(unused)] // It is actually
pub fn new_extractor_from_hex(
    code: impl AsRef<str>,
    layout: CodeLayout,
) -> anyhow::Result<InitialExtractor> {
    let contract = Contract::from_hex(code.as_ref(), layout)?;
    Ok(ecr::new(contract, resolver::Config::default()))
}

/// Constructs a new extractor to analyze the provided `bytecode`.
#[allow(unused)] // It is actually
pub fn new_extractor(bytecode: Vec<u8>, layout: CodeLayout) -> InitialExtractor {
    ecr::new(Contract::new(bytecode, layout), resolver::Config::default())
}

/// Builds the creation code for a contract whose constructor runs `constructor`
/// and then deploys `runtime`.
///
/// The deployment is done the way `solc` does it, with a `CODECOPY` of the
/// runtime code from a constant offset followed by a `RETURN`.
#[allow(unused)] // It is actually
pub fn creation_code(constructor: &[u8], runtime: &[u8]) -> anyhow::Result<Vec<u8>> {
    // PUSH2 + DUP1 + PUSH2 + PUSH0 + CODECOPY + PUSH0 + RETURN
    const DEPLOY_LENGTH: usize = 11;

    let entry = u16::try_from(constructor.len() + DEPLOY_LENGTH)?;
    let length = u16::try_from(runtime.len())?;

    let mut bytes = constructor.to_vec();
    bytes.extend(bytecode![
        PushN::new(2, length.to_be_bytes().to_vec())?,
        Opcode::Dup(1),
        PushN::new(2, entry.to_be_bytes().to_vec())?,
        Opcode::Push0,
        Opcode::CodeCopy,
        Opcode::Push0,
        Opcode::Return,
    ]);
    bytes.extend(runtime);

    Ok(bytes)
}

/// Builds the code to store the 20-byte constant made of `address_byte` in the
/// storage `slot`.
#[allow(unused)] // It is actually
pub fn store_address(slot: u8, address_byte: u8) -> anyhow::Result<Vec<u8>> {
    Ok(bytecode![
        PushN::new(20, vec![address_byte; 20])?,
        PushN::new(1, vec![slot])?,
        Opcode::SStore,
    ])
}

/// Builds a `call_opcode` whose target address is computed by `address`, with
/// zeroes for every other operand. The result of the call is discarded.
#[allow(unused)] // It is actually
pub fn call(call_opcode: Opcode, address: Vec<u8>) -> Vec<u8> {
    let mut bytes = vec![];
    // Return size, return offset, argument size and argument offset.
    for _ in 0..4 {
        bytes.extend(Opcode::Push0.encode());
    }
    if matches!(call_opcode, Opcode::Call | Opcode::CallCode) {
        // Value
        bytes.extend(Opcode::Push0.encode());
    }
    bytes.extend(address);
    bytes.extend(bytecode![Opcode::Gas, call_opcode, Opcode::Pop]);
    bytes
}

/// Builds the code to load the address in storage `slot`.
#[allow(unused)] // It is actually
pub fn load_slot(slot: u8) -> anyhow::Result<Vec<u8>> {
    Ok(bytecode![PushN::new(1, vec![slot])?, Opcode::SLoad])
}

/// Builds a Swarm metadata trailer containing a hash made of `hash_byte`.
#[allow(unused)] // It is actually
pub fn swarm_trailer(hash_byte: u8) -> Vec<u8> {
    let mut bytes = vec![0xa1, 0x65];
    bytes.extend(b"bzzr0");
    bytes.extend([0x58, 0x20]);
    bytes.extend([hash_byte; 32]);
    bytes.extend([0x00, 0x29]);
    bytes
}

/// Formats the 20-byte address made of `byte` as `0x`-prefixed hex.
#[allow(unused)] // It is actually
pub fn address_of(byte: u8) -> String {
    format!("0x{}", hex::encode([byte; 20]))
}
