//! The cross-phase correlator, which resolves runtime calls whose target is
//! loaded from a storage slot that only the constructor writes to.
//!
//! Solidity initialises storage variables with constant values in the
//! constructor. When the runtime code never writes the same slot, and cannot be
//! shown not to, the value seen by a runtime load is the one that the
//! constructor stored.
//!
//! The correlation is conservative:
//!
//! - The constructor must write the slot exactly once, and with a constant.
//! - Any runtime write to the slot blocks resolution of that slot.
//! - Any runtime write whose slot is not known blocks resolution of every slot,
//!   as it may alias any of them.

use std::collections::{HashMap, HashSet};

use ethnum::U256;
use tracing::{debug, info};

use crate::{
    opcode::Opcode,
    program::{Instruction, Program},
};

/// Resolves the calls in `runtime` that depend on storage slots initialised
/// with a constant in `constructor`, returning the number of calls resolved.
///
/// Both programs must already have been through [`super::find_calls`] and
/// [`super::find_stores`].
pub fn resolve_with_constructor_constants(runtime: &mut Program, constructor: &Program) -> usize {
    let initialised = constructor_constants(constructor);
    let Some(overwritten) = runtime_written_slots(runtime) else {
        info!("Runtime writes to unknown storage slots, skipping constructor correlation");
        return 0;
    };

    let mut resolved = 0;
    for block in runtime.blocks_mut() {
        for instruction in block.instructions_mut() {
            let Some(call) = instruction.annotations.call.as_mut() else {
                continue;
            };
            if !call.depends_on_storage() {
                continue;
            }
            let Some(slot) = call.storage_slot() else {
                continue;
            };
            if overwritten.contains(&slot) {
                debug!(offset = call.offset, %slot, "Slot is written at runtime");
                continue;
            }

            match initialised.get(&slot).map(Vec::as_slice) {
                Some([Some(value)]) => {
                    debug!(offset = call.offset, %slot, %value, "Resolved from constructor");
                    call.address = Some(*value);
                    call.resolved_by_constructor = true;
                    resolved += 1;
                }
                Some(_) => debug!(offset = call.offset, %slot, "Slot is not a single constant"),
                None => debug!(offset = call.offset, %slot, "Slot is not set by constructor"),
            }
        }
    }

    info!(resolved, "Correlated runtime calls with constructor constants");
    resolved
}

/// Gathers, for each constant slot that the constructor writes to, the
/// constant written by each of those writes (or [`None`] where the value is
/// not a constant).
fn constructor_constants(constructor: &Program) -> HashMap<U256, Vec<Option<U256>>> {
    let mut constants: HashMap<U256, Vec<Option<U256>>> = HashMap::new();
    for store in constructor.instructions().filter_map(|i| i.annotations.store.as_ref()) {
        if let Some(slot) = store.to_address {
            constants.entry(slot).or_default().push(store.constant_data());
        }
    }
    constants
}

/// Gathers the slots that the runtime code writes to, or [`None`] if any write
/// has a slot that is not known.
fn runtime_written_slots(runtime: &Program) -> Option<HashSet<U256>> {
    runtime
        .instructions()
        .filter(|i| i.opcode() == Opcode::SStore)
        .map(written_slot)
        .collect()
}

fn written_slot(instruction: &Instruction) -> Option<U256> {
    let slot = instruction.annotations.store.as_ref().and_then(|s| s.to_address);
    if slot.is_none() {
        debug!(offset = instruction.offset(), "Write to unknown slot");
    }
    slot
}
