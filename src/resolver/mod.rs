//! This module contains the resolvers, which recover the constant operands of
//! calls and storage writes by tracing their reaching definitions backwards.
//!
//! Each resolver runs over a single [`Program`] that has already been through
//! [`crate::program::reaching::perform_reaching_analysis`], and writes its
//! findings to the [`crate::program::Annotations`] of the instructions it
//! inspects. The correlator then combines the findings of the constructor and
//! runtime phases of a contract.
//!
//! The passes must run one after the other on any given program: resolve calls
//! and stores on both phases, then correlate.

pub mod calls;
pub mod correlate;
pub mod stores;
pub mod tracer;

use ethnum::U256;
use tracing::{debug, warn};

pub use self::{
    calls::find_calls,
    correlate::resolve_with_constructor_constants,
    stores::find_stores,
};
use crate::{
    constant::{CODE_ENTRY_EVALUATION_DEPTH, DEFAULT_MAXIMUM_TRACE_DEPTH, DEFAULT_SLOT_TRACE_DEPTH},
    opcode::Opcode,
    program::{Instruction, Program},
    resolver::tracer::Tracer,
};

/// The configuration for the resolvers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The recursion budget for the backward trace of each operand.
    ///
    /// Defaults to [`DEFAULT_MAXIMUM_TRACE_DEPTH`].
    pub maximum_trace_depth: usize,

    /// The recursion budget for the secondary trace that recovers the constant
    /// key operand below a `SLOAD` or `CALLDATALOAD`.
    ///
    /// Defaults to [`DEFAULT_SLOT_TRACE_DEPTH`].
    pub slot_trace_depth: usize,
}

impl Config {
    /// Sets the `maximum_trace_depth` config parameter to `value`.
    #[must_use]
    pub fn with_maximum_trace_depth(mut self, value: usize) -> Self {
        self.maximum_trace_depth = value;
        self
    }

    /// Sets the `slot_trace_depth` config parameter to `value`.
    #[must_use]
    pub fn with_slot_trace_depth(mut self, value: usize) -> Self {
        self.slot_trace_depth = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maximum_trace_depth: DEFAULT_MAXIMUM_TRACE_DEPTH,
            slot_trace_depth:    DEFAULT_SLOT_TRACE_DEPTH,
        }
    }
}

/// Finds the offset at which the runtime code begins in a program that
/// includes its constructor.
///
/// The constructor deploys the runtime code with a `CODECOPY` whose source
/// offset operand is a constant, so this is the value of that operand for the
/// last `CODECOPY` in the program. The operand may be pushed directly or
/// computed from pushes with `ADD`, `SUB` and `MUL`, as long as every operand
/// along the way has a single producer. Returns [`None`] if no `CODECOPY` has
/// such an operand.
///
/// # Panics
///
/// If the reaching-definitions pass has not been run over `program`.
#[must_use]
pub fn find_code_entry_point(program: &Program, config: &Config) -> Option<u32> {
    let tracer = Tracer::new(program, config);
    let mut entry_point = None;

    for instruction in program.instructions().filter(|i| i.opcode() == Opcode::CodeCopy) {
        match evaluate_operand(&tracer, instruction, 1, CODE_ENTRY_EVALUATION_DEPTH) {
            Some(value) if value <= U256::from(u32::MAX) => {
                debug!(codecopy = instruction.offset(), entry = value.as_u32(), "Found code copy");
                entry_point = Some(value.as_u32());
            }
            Some(value) => warn!(codecopy = instruction.offset(), %value, "Code offset too large"),
            None => debug!(codecopy = instruction.offset(), "Code copy has no constant offset"),
        }
    }

    entry_point
}

/// Evaluates operand `n` of `instruction` as a constant, looking through at
/// most `depth` instructions that compute it.
fn evaluate_operand(
    tracer: &Tracer,
    instruction: &Instruction,
    n: usize,
    depth: usize,
) -> Option<U256> {
    let producers = tracer.producers(instruction, n);
    if depth == 0 || producers.len() != 1 {
        return None;
    }

    let producer = tracer.program().instruction(*producers.first()?)?;
    let operand = |n| evaluate_operand(tracer, producer, n, depth - 1);
    match producer.opcode() {
        opcode if opcode.is_push() => producer.immediate(),
        Opcode::Add => Some(operand(0)?.wrapping_add(operand(1)?)),
        Opcode::Sub => Some(operand(0)?.wrapping_sub(operand(1)?)),
        Opcode::Mul => Some(operand(0)?.wrapping_mul(operand(1)?)),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use crate::{
        bytecode,
        opcode::{Opcode, PushN},
        program::{reaching::perform_reaching_analysis, Program},
        resolver::{find_code_entry_point, Config},
    };

    #[test]
    fn finds_last_code_copy_offset() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x10])?, // Size
            PushN::new(1, vec![0x20])?, // Offset
            Opcode::Push0,              // Destination
            Opcode::CodeCopy,
            PushN::new(1, vec![0x10])?,
            PushN::new(2, vec![0x01, 0x00])?,
            Opcode::Push0,
            Opcode::CodeCopy,
            Opcode::Stop,
        ];
        let mut program = Program::try_from(bytes.as_slice())?;
        perform_reaching_analysis(&mut program);

        assert_eq!(find_code_entry_point(&program, &Config::default()), Some(0x100));

        Ok(())
    }

    #[test]
    fn folds_constant_arithmetic_in_offsets() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x10])?, // Size
            PushN::new(1, vec![0x02])?,
            PushN::new(1, vec![0x20])?,
            PushN::new(1, vec![0x30])?,
            Opcode::Sub,                // 0x30 - 0x20
            Opcode::Mul,                // 0x10 * 0x02
            Opcode::Push0,              // Destination
            Opcode::CodeCopy,
            Opcode::Stop,
        ];
        let mut program = Program::try_from(bytes.as_slice())?;
        perform_reaching_analysis(&mut program);

        assert_eq!(find_code_entry_point(&program, &Config::default()), Some(0x20));

        Ok(())
    }

    #[test]
    fn ignores_non_constant_offsets() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x10])?,
            Opcode::CallValue,
            PushN::new(1, vec![0x20])?,
            Opcode::Add,
            Opcode::Push0,
            Opcode::CodeCopy,
            Opcode::Stop,
        ];
        let mut program = Program::try_from(bytes.as_slice())?;
        perform_reaching_analysis(&mut program);

        assert_eq!(find_code_entry_point(&program, &Config::default()), None);

        Ok(())
    }

    #[test]
    fn builds_config() {
        let config = Config::default().with_maximum_trace_depth(8).with_slot_trace_depth(1);
        assert_eq!(config.maximum_trace_depth, 8);
        assert_eq!(config.slot_trace_depth, 1);
        assert_eq!(Config::default().maximum_trace_depth, 1024);
    }
}
