//! This module is an integration test that checks the resolution of storage
//! writes, and the listing of the analysed program.
#![cfg(test)]

use ethnum::U256;
use evm_call_resolver::{
    bytecode,
    extractor::contract::CodeLayout,
    opcode::{Opcode, PushN},
    resolver::tracer::Terminal,
};

mod common;

#[test]
fn resolves_storage_writes() -> anyhow::Result<()> {
    let mut bytes = common::store_address(0x01, 0x10)?;
    bytes.extend(bytecode![
        // Copy an argument into slot 2
        PushN::new(1, vec![0x24])?,
        Opcode::CallDataLoad,
        PushN::new(1, vec![0x02])?,
        Opcode::SStore,
        // Copy slot 1 into slot 3
        PushN::new(1, vec![0x01])?,
        Opcode::SLoad,
        PushN::new(1, vec![0x03])?,
        Opcode::SStore,
        // Write the caller into an unknown slot
        Opcode::Caller,
        Opcode::CallValue,
        Opcode::SStore,
        Opcode::Stop,
    ]);

    let phases = common::new_extractor(bytes, CodeLayout::RuntimeOnly).analyze()?;
    let stores = phases.stores();
    assert_eq!(stores.len(), 3);

    assert_eq!(stores[0].to_address, Some(U256::new(1)));
    assert_eq!(stores[0].trace_data.terminal(), Terminal::Constant);

    assert_eq!(stores[1].to_address, Some(U256::new(2)));
    assert_eq!(stores[1].data, Some(U256::new(0x24)));
    assert_eq!(stores[1].to_string(), "STORE CALLDATA 0x24 to 0x2");

    assert_eq!(stores[2].to_address, Some(U256::new(3)));
    assert_eq!(stores[2].to_string(), "STORE SLOAD 0x1 to 0x3");
    let sub_trace = stores[2].trace_data.sub_trace.as_ref().expect("No slot trace");
    assert_eq!(sub_trace.terminal(), Terminal::Constant);

    // The write of the caller has neither operand traced, so is not annotated.
    let unannotated = phases
        .runtime()
        .instructions()
        .filter(|i| i.opcode() == Opcode::SStore && i.annotations.store.is_none())
        .count();
    assert_eq!(unannotated, 1);

    Ok(())
}

#[test]
fn renders_listing_with_entry_stacks() -> anyhow::Result<()> {
    let bytes = bytecode![
        PushN::new(1, vec![0x2a])?,
        PushN::new(1, vec![0x05])?,
        Opcode::Jump,
        Opcode::JumpDest,
        Opcode::Pop,
        Opcode::Stop,
    ];

    let extractor = common::new_extractor(bytes, CodeLayout::RuntimeOnly).disassemble()?;
    let listing = extractor.phases().runtime().to_string();

    assert!(listing.contains("# Stack: []"));
    assert!(listing.contains("# Stack: [{0x0}]"));
    assert!(listing.contains("0x5\tJUMPDEST"));

    Ok(())
}
