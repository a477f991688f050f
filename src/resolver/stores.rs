//! The store resolver, which finds out where each storage write in a program
//! writes to and what it writes.

use std::fmt::{Display, Formatter};

use ethnum::U256;
use tracing::debug;

use crate::{
    opcode::Opcode,
    program::Program,
    resolver::{
        tracer::{Filter, Terminal, TraceResult, Tracer},
        Config,
    },
    utility::format_word,
};

/// The stack slot holding the storage key of an `SSTORE`.
pub const STORE_KEY_OPERAND: usize = 0;

/// The stack slot holding the value written by an `SSTORE`.
pub const STORE_VALUE_OPERAND: usize = 1;

/// The resolution of an `SSTORE`.
///
/// Only present when both operands were traced to something, though either
/// trace may have ended without a constant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreOn {
    /// The constant storage slot written to, if known.
    pub to_address: Option<U256>,

    /// The constant value written, or the constant key of the load that it
    /// comes from, if known.
    pub data: Option<U256>,

    /// The trace of the storage key operand.
    pub trace_to_address: TraceResult,

    /// The trace of the value operand.
    pub trace_data: TraceResult,
}

impl StoreOn {
    /// Creates the resolution of a storage write from the traces of its two
    /// operands.
    #[must_use]
    pub fn new(trace_to_address: TraceResult, trace_data: TraceResult) -> Self {
        Self {
            to_address: trace_to_address.value,
            data: trace_data.value,
            trace_to_address,
            trace_data,
        }
    }

    /// Gets the constant value written, if the write is of a constant.
    #[must_use]
    pub fn constant_data(&self) -> Option<U256> {
        (self.trace_data.terminal() == Terminal::Constant)
            .then_some(self.data)
            .flatten()
    }
}

impl Display for StoreOn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let to = format_word(self.to_address);
        let data = format_word(self.data);
        match self.trace_data.terminal() {
            Terminal::CallDataLoad => write!(f, "STORE CALLDATA {data} to {to}"),
            Terminal::StorageLoad => write!(f, "STORE SLOAD {data} to {to}"),
            _ => write!(f, "STORE {data} to {to}"),
        }
    }
}

/// Resolves the slot and value of every `SSTORE` in the program, annotating
/// each with a [`StoreOn`] if both of its operands could be traced.
///
/// Writes for which either trace found nothing have any previous store
/// annotation cleared.
///
/// # Panics
///
/// If the reaching-definitions pass has not been run over `program`.
pub fn find_stores(program: &mut Program, config: &Config) {
    let mut tracer = Tracer::new(program, config);
    let stores: Vec<(u32, Option<StoreOn>)> = program
        .instructions()
        .filter(|i| i.opcode() == Opcode::SStore)
        .map(|instruction| {
            debug!(offset = instruction.offset(), "Tracing back {instruction}");
            let depth = config.maximum_trace_depth;
            let data = tracer.trace_operand(
                instruction,
                STORE_VALUE_OPERAND,
                Filter::AddressOrDependence,
                depth,
            );
            let to =
                tracer.trace_operand(instruction, STORE_KEY_OPERAND, Filter::NextPush, depth);

            let store = match (to, data) {
                (Some(to), Some(data)) => {
                    debug!(offset = instruction.offset(), to = %to, data = %data, "Resolved");
                    Some(StoreOn::new(to, data))
                }
                _ => {
                    debug!(offset = instruction.offset(), "Store left unresolved");
                    None
                }
            };
            (instruction.offset(), store)
        })
        .collect();

    for (offset, store) in stores {
        if let Some(instruction) = program.instruction_mut(offset) {
            instruction.annotations.store = store;
        }
    }
}
