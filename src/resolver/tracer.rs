//! This module contains the backward tracer, which walks the reaching
//! definitions of an operand back towards the instruction that produced its
//! value.
//!
//! # Search Order
//!
//! The search is depth bounded and first-match: the candidates of a frontier
//! are first each inspected by the [`Filter`] in the order that the reaching
//! definitions list them, and the first one that is accepted ends the search.
//! Only if no candidate is accepted does the search descend, trying the
//! operands of each candidate in turn (candidates in frontier order, operands
//! in increasing index order) with one less unit of depth. The first result
//! found below wins.
//!
//! # Termination
//!
//! The reaching-definitions relation may be cyclic, and the depth bound is
//! what guarantees termination. It is checked on every descent. Instructions
//! may legitimately be revisited along different operand paths within the
//! bound, so there is no visited set. The tracer does remember the largest
//! budget with which the operands of an instruction were already searched
//! without success: a search with that budget or less cannot succeed either,
//! and is skipped.

use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

use ethnum::U256;
use tracing::trace;

use crate::{
    constant::{ADDRESS_MASK, ADDRESS_WIDTH_BYTES},
    opcode::Opcode,
    program::{reaching::Producers, Instruction, Program},
    resolver::Config,
};

/// The outcome of a successful backward trace.
///
/// A result always records the instruction that ended the trace. Whether it
/// has a `value` depends on what that instruction was:
///
/// - For a constant push, the pushed value.
/// - For a `SLOAD` or `CALLDATALOAD`, the constant key that it loads from, if
///   the `sub_trace` recovered it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceResult {
    /// The offset of the instruction that ended the trace.
    pub offset: u32,

    /// The opcode of the instruction that ended the trace.
    pub opcode: Opcode,

    /// The value that the trace established, if any.
    pub value: Option<U256>,

    /// The trace of the key operand of a load that ended the trace.
    pub sub_trace: Option<Box<TraceResult>>,
}

impl TraceResult {
    /// Gets the kind of instruction that ended the trace.
    #[must_use]
    pub fn terminal(&self) -> Terminal {
        match self.opcode {
            Opcode::SLoad => Terminal::StorageLoad,
            Opcode::CallDataLoad => Terminal::CallDataLoad,
            op if op.is_push() => Terminal::Constant,
            _ => Terminal::Other,
        }
    }
}

impl Display for TraceResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.value {
            Some(value) => write!(f, "{}(0x{value:x})", self.opcode),
            None => write!(f, "{}(?)", self.opcode),
        }
    }
}

/// The kinds of instruction that can end a trace.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Terminal {
    /// A push of an immediate value.
    Constant,

    /// A `SLOAD`, so the value comes from storage.
    StorageLoad,

    /// A `CALLDATALOAD`, so the value comes from the call input.
    CallDataLoad,

    /// Anything else.
    Other,
}

/// The strategies for deciding whether an instruction ends a trace.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Filter {
    /// Accepts a `PUSH20` of anything but [`ADDRESS_MASK`] as a constant, and
    /// accepts `SLOAD` and `CALLDATALOAD` as dependencies on storage and on
    /// the call input respectively.
    AddressOrDependence,

    /// Accepts the nearest push of any width.
    NextPush,
}

/// A backward tracer over the reaching definitions of a single [`Program`].
///
/// The program must have been through
/// [`crate::program::reaching::perform_reaching_analysis`].
#[derive(Debug)]
pub struct Tracer<'a> {
    program: &'a Program,
    config:  &'a Config,

    /// The largest budget with which the operands of an instruction have been
    /// searched unsuccessfully, per filter.
    exhausted: HashMap<(Filter, u32), usize>,
}

impl<'a> Tracer<'a> {
    /// Creates a new tracer over `program`.
    #[must_use]
    pub fn new(program: &'a Program, config: &'a Config) -> Self {
        Self {
            program,
            config,
            exhausted: HashMap::new(),
        }
    }

    /// Gets the program that the tracer runs over.
    #[must_use]
    pub fn program(&self) -> &'a Program {
        self.program
    }

    /// Traces the value of operand `n` of `instruction` back, using `filter`
    /// and a recursion budget of `max_depth`.
    ///
    /// # Panics
    ///
    /// If the reaching definitions are missing or malformed. See
    /// [`Self::producers`].
    pub fn trace_operand(
        &mut self,
        instruction: &Instruction,
        n: usize,
        filter: Filter,
        max_depth: usize,
    ) -> Option<TraceResult> {
        let candidates = self.producers(instruction, n);
        self.trace_back(&candidates, filter, max_depth)
    }

    /// Traces back from the `candidates` frontier, using `filter` to decide
    /// which instruction ends the trace.
    ///
    /// Returns [`None`] if the frontier is empty, the depth budget is used up,
    /// or the search is exhausted without `filter` accepting anything.
    ///
    /// # Panics
    ///
    /// If a candidate is not an instruction in the program, or the reaching
    /// definitions are missing or malformed.
    pub fn trace_back(
        &mut self,
        candidates: &Producers,
        filter: Filter,
        max_depth: usize,
    ) -> Option<TraceResult> {
        if max_depth == 0 || candidates.is_empty() {
            return None;
        }

        let program = self.program;
        let instructions: Vec<&Instruction> =
            candidates.iter().map(|offset| Self::resolve(program, *offset)).collect();

        for instruction in &instructions {
            if let Some(result) = self.inspect(filter, instruction) {
                return Some(result);
            }
        }

        instructions
            .into_iter()
            .find_map(|instruction| self.trace_children(instruction, filter, max_depth))
    }

    /// Traces back through each operand of `instruction` in order, returning
    /// the first result. A `max_depth` of zero finds nothing.
    ///
    /// # Panics
    ///
    /// If the reaching definitions are missing or malformed.
    pub fn trace_children(
        &mut self,
        instruction: &Instruction,
        filter: Filter,
        max_depth: usize,
    ) -> Option<TraceResult> {
        if max_depth == 0 {
            return None;
        }

        let key = (filter, instruction.offset());
        if self.exhausted.get(&key).is_some_and(|budget| *budget >= max_depth) {
            return None;
        }

        for n in 0..instruction.opcode().arg_count() {
            let candidates = self.producers(instruction, n);
            if let Some(result) = self.trace_back(&candidates, filter, max_depth - 1) {
                return Some(result);
            }
        }

        if max_depth == 1 {
            trace!(offset = instruction.offset(), "Trace depth exhausted");
        }
        let budget = self.exhausted.entry(key).or_default();
        *budget = (*budget).max(max_depth);

        None
    }

    /// Gets the producers of operand `n` of `instruction`.
    ///
    /// # Panics
    ///
    /// If `instruction` has no reaching definitions, which means that the
    /// reaching-definitions pass was not run, or if the definitions do not
    /// cover the number of operands that its opcode reads.
    #[must_use]
    pub fn producers(&self, instruction: &Instruction, n: usize) -> Producers {
        let reaching = instruction.annotations.reaching.as_ref().unwrap_or_else(|| {
            panic!(
                "Instruction {} at {:#x} has no reaching definitions",
                instruction.opcode(),
                instruction.offset()
            )
        });
        let arity = instruction.opcode().arg_count();
        if reaching.len() != arity {
            panic!(
                "Instruction {} at {:#x} reads {arity} operands but has definitions for {}",
                instruction.opcode(),
                instruction.offset(),
                reaching.len()
            );
        }

        reaching.operand(n).cloned().unwrap_or_default()
    }

    /// Applies `filter` to `instruction`, returning the result if it is
    /// accepted.
    fn inspect(&mut self, filter: Filter, instruction: &Instruction) -> Option<TraceResult> {
        let opcode = instruction.opcode();
        match filter {
            Filter::AddressOrDependence => match opcode {
                Opcode::Push(ADDRESS_WIDTH_BYTES) => instruction
                    .immediate()
                    .filter(|value| *value != ADDRESS_MASK)
                    .map(|value| Self::terminal(instruction, Some(value), None)),
                Opcode::SLoad | Opcode::CallDataLoad => {
                    let depth = self.config.slot_trace_depth;
                    let sub_trace = self.trace_children(instruction, Filter::NextPush, depth);
                    let value = sub_trace.as_ref().and_then(|t| t.value);
                    Some(Self::terminal(instruction, value, sub_trace))
                }
                _ => None,
            },
            Filter::NextPush => opcode
                .is_push()
                .then(|| Self::terminal(instruction, instruction.immediate(), None)),
        }
    }

    fn terminal(
        instruction: &Instruction,
        value: Option<U256>,
        sub_trace: Option<TraceResult>,
    ) -> TraceResult {
        TraceResult {
            offset: instruction.offset(),
            opcode: instruction.opcode(),
            value,
            sub_trace: sub_trace.map(Box::new),
        }
    }

    fn resolve(program: &Program, offset: u32) -> &Instruction {
        program
            .instruction(offset)
            .unwrap_or_else(|| panic!("No instruction at reaching definition {offset:#x}"))
    }
}
