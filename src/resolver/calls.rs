//! The call-target resolver, which finds out what each call in a program is
//! calling.

use std::fmt::{Display, Formatter};

use ethnum::U256;
use serde::Serialize;
use tracing::debug;

use crate::{
    opcode::Opcode,
    program::Program,
    resolver::{
        tracer::{Filter, Terminal, TraceResult, Tracer},
        Config,
    },
    utility::{format_address, format_word},
};

/// The stack slot holding the target address of every call of interest.
pub const CALL_ADDRESS_OPERAND: usize = 1;

/// What the target of a call was found to depend on.
///
/// Exactly one applies to any call, checked in the order the variants are
/// declared.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum CallDependence {
    /// The address is loaded from storage, and has not been resolved from the
    /// constructor.
    Storage,

    /// The address is read from the call input.
    CallData,

    /// The address is a known constant.
    Constant,

    /// Nothing useful was found within the trace budget.
    Unknown,
}

/// The resolution of the target of a `CALL`, `CALLCODE` or `DELEGATECALL`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallOnAddress {
    /// The offset of the call instruction.
    pub offset: u32,

    /// The kind of call.
    pub opcode: Opcode,

    /// The constant target address, if one is known.
    pub address: Option<U256>,

    /// Whether `address` was only established by correlating a storage load
    /// with a write in the constructor.
    pub resolved_by_constructor: bool,

    /// The trace of the address operand, if it found anything.
    pub trace: Option<TraceResult>,
}

impl CallOnAddress {
    /// Creates the resolution of a call from the trace of its address operand.
    #[must_use]
    pub fn new(offset: u32, opcode: Opcode, trace: Option<TraceResult>) -> Self {
        let address = trace
            .as_ref()
            .filter(|t| t.terminal() == Terminal::Constant)
            .and_then(|t| t.value);
        Self {
            offset,
            opcode,
            address,
            resolved_by_constructor: false,
            trace,
        }
    }

    /// Classifies what the target of the call depends on.
    #[must_use]
    pub fn classification(&self) -> CallDependence {
        let terminal = self.trace.as_ref().map(TraceResult::terminal);
        match terminal {
            Some(Terminal::StorageLoad) if !self.resolved_by_constructor => CallDependence::Storage,
            Some(Terminal::CallDataLoad) => CallDependence::CallData,
            _ if self.address.is_some() => CallDependence::Constant,
            _ => CallDependence::Unknown,
        }
    }

    #[must_use]
    pub fn depends_on_storage(&self) -> bool {
        self.classification() == CallDependence::Storage
    }

    #[must_use]
    pub fn depends_on_calldata(&self) -> bool {
        self.classification() == CallDependence::CallData
    }

    #[must_use]
    pub fn depends_on_unknown(&self) -> bool {
        self.classification() == CallDependence::Unknown
    }

    /// Checks whether the call has a known constant target.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.classification() == CallDependence::Constant
    }

    /// Gets the constant storage slot that the target is loaded from, if it is
    /// loaded from storage and the slot is known.
    #[must_use]
    pub fn storage_slot(&self) -> Option<U256> {
        self.trace
            .as_ref()
            .filter(|t| t.terminal() == Terminal::StorageLoad)
            .and_then(|t| t.value)
    }

    /// Gets the record of the call that is emitted as JSON.
    #[must_use]
    pub fn to_output(&self) -> CallOutput {
        let classification = self.classification();
        CallOutput {
            address:             self
                .address
                .filter(|_| classification == CallDependence::Constant)
                .map(format_address),
            call_type:           self.opcode.as_text_code(),
            ctor_resolved:       self.resolved_by_constructor,
            depends_on_storage:  classification == CallDependence::Storage,
            depends_on_calldata: classification == CallDependence::CallData,
            depends_on_unknown:  classification == CallDependence::Unknown,
        }
    }
}

impl Display for CallOnAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let loaded = || format_word(self.trace.as_ref().and_then(|t| t.value));
        match self.classification() {
            CallDependence::Storage => write!(f, "{} depends on SLOAD {}", self.opcode, loaded()),
            CallDependence::CallData => {
                write!(f, "{} depends on CALLDATA {}", self.opcode, loaded())
            }
            CallDependence::Constant => {
                let address = self.address.map(format_address).unwrap_or_default();
                write!(f, "{} on {address}", self.opcode)?;
                if self.resolved_by_constructor {
                    write!(f, " (from constructor)")?;
                }
                Ok(())
            }
            CallDependence::Unknown => write!(f, "{} depends on unknown", self.opcode),
        }
    }
}

/// The serialized form of a [`CallOnAddress`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutput {
    pub address:             Option<String>,
    pub call_type:           String,
    pub ctor_resolved:       bool,
    pub depends_on_storage:  bool,
    pub depends_on_calldata: bool,
    pub depends_on_unknown:  bool,
}

/// Resolves the target of every `CALL`, `CALLCODE` and `DELEGATECALL` in the
/// program, annotating each of them with a [`CallOnAddress`].
///
/// Any previous call annotations are replaced.
///
/// # Panics
///
/// If the reaching-definitions pass has not been run over `program`.
pub fn find_calls(program: &mut Program, config: &Config) {
    let mut tracer = Tracer::new(program, config);
    let calls: Vec<CallOnAddress> = program
        .instructions()
        .filter(|i| i.opcode().is_call())
        .map(|instruction| {
            debug!(offset = instruction.offset(), "Tracing back {instruction}");
            let trace = tracer.trace_operand(
                instruction,
                CALL_ADDRESS_OPERAND,
                Filter::AddressOrDependence,
                config.maximum_trace_depth,
            );
            let call = CallOnAddress::new(instruction.offset(), instruction.opcode(), trace);
            debug!(offset = instruction.offset(), "{call}");
            call
        })
        .collect();

    for call in calls {
        if let Some(instruction) = program.instruction_mut(call.offset) {
            instruction.annotations.call = Some(call);
        }
    }
}
