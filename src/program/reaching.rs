//! This module contains the reaching-definitions pass, which determines for
//! every instruction which other instructions could have produced each of the
//! stack slots that it consumes.
//!
//! # Abstract Stack
//!
//! The pass executes each block over an abstract stack whose slots are sets of
//! producer offsets. `DUPN` and `SWAPN` only rearrange those sets, so they are
//! never producers themselves and the definitions seen by a consumer always
//! name the instruction that computed the value. Every other instruction pops
//! its arguments and pushes singleton sets containing its own offset.
//!
//! # Control Flow
//!
//! Blocks flow into the block that follows them, unless they end in a halting
//! instruction or an unconditional `JUMP`. Jumps flow to every `JUMPDEST` that
//! is named by a push producing the jump destination.
//!
//! At a merge point the stacks are aligned at the top and the taller one is
//! truncated, with the sets in each slot unioned in arrival order. As heights
//! only ever shrink and sets only ever grow the fixpoint iteration terminates.

use std::{
    collections::VecDeque,
    fmt::{Display, Formatter},
};

use ethnum::U256;
use indexmap::IndexSet;
use itertools::Itertools;
use tracing::{debug, trace};

use crate::{
    constant::MAXIMUM_STACK_DEPTH,
    opcode::Opcode,
    program::{format_producers, Program},
};

/// The ordered set of offsets of the instructions that could have produced a
/// stack slot.
///
/// The order is that in which the producers were discovered, and is
/// deterministic for a given program.
pub type Producers = IndexSet<u32>;

/// The reaching definitions for the stack slots consumed by an instruction.
///
/// Operand `0` is the top of the stack at entry to the instruction. The number
/// of operands always equals [`Opcode::arg_count`] for the instruction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReachingDefinition {
    operands: Vec<Producers>,
}

impl ReachingDefinition {
    /// Creates a new reaching definition from the producers of each operand.
    #[must_use]
    pub fn new(operands: Vec<Producers>) -> Self {
        Self { operands }
    }

    /// Gets the producers of operand `n`, if the instruction has that many
    /// operands.
    #[must_use]
    pub fn operand(&self, n: usize) -> Option<&Producers> {
        self.operands.get(n)
    }

    /// Gets the number of operands that definitions are recorded for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operands.len()
    }

    /// Checks if the definition has no operands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }
}

/// An abstract stack of producer sets.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StackState {
    /// The slots, with the top of the stack last.
    slots: Vec<Producers>,
}

impl StackState {
    /// Gets the producers of the slot `n` from the top, where `0` is the top.
    #[must_use]
    pub fn slot(&self, n: usize) -> Option<&Producers> {
        self.slots.len().checked_sub(n + 1).map(|i| &self.slots[i])
    }

    /// Gets the height of the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Checks if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Popping below the known stack yields a slot with no producers.
    fn pop(&mut self) -> Producers {
        self.slots.pop().unwrap_or_default()
    }

    fn push(&mut self, producers: Producers) {
        if self.slots.len() == MAXIMUM_STACK_DEPTH {
            self.slots.remove(0);
        }
        self.slots.push(producers);
    }

    fn dup(&mut self, n: u8) {
        let duplicated = self.slot(n as usize - 1).cloned().unwrap_or_default();
        self.push(duplicated);
    }

    fn swap(&mut self, n: u8) {
        let n = n as usize;
        while self.slots.len() <= n {
            self.slots.insert(0, Producers::default());
        }
        let top = self.slots.len() - 1;
        self.slots.swap(top, top - n);
    }

    /// Merges `other` into `self`, returning `true` if `self` changed.
    fn merge(&mut self, other: &StackState) -> bool {
        let mut changed = false;
        if other.slots.len() < self.slots.len() {
            let excess = self.slots.len() - other.slots.len();
            self.slots.drain(..excess);
            changed = true;
        }

        let skip = other.slots.len() - self.slots.len();
        for (mine, theirs) in self.slots.iter_mut().zip(&other.slots[skip..]) {
            let before = mine.len();
            mine.extend(theirs.iter().copied());
            changed |= mine.len() != before;
        }

        changed
    }

    /// Applies the stack effect of the instruction at `offset` to the stack,
    /// returning the definitions of the operands it consumes.
    fn step(&mut self, offset: u32, opcode: Opcode) -> ReachingDefinition {
        let reads = opcode.arg_count();
        let operands = (0..reads).map(|n| self.slot(n).cloned().unwrap_or_default()).collect();

        match opcode {
            Opcode::Dup(n) => self.dup(n),
            Opcode::Swap(n) => self.swap(n),
            _ => {
                for _ in 0..reads {
                    self.pop();
                }
                for _ in 0..opcode.stack_writes() {
                    self.push(Producers::from([offset]));
                }
            }
        }

        ReachingDefinition::new(operands)
    }
}

/// Renders the stack from the top down.
impl Display for StackState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]",
            self.slots.iter().rev().map(format_producers).join(", ")
        )
    }
}

/// Computes the reaching definitions for every instruction in `program`,
/// storing them in [`crate::program::Annotations::reaching`] and the stack on
/// entry to each block in [`crate::program::Block::entry_stack`]. Blocks that
/// a resolved jump can reach are marked in
/// [`crate::program::Block::is_jumped_to`].
///
/// Blocks that are not reachable from the start of the program are analysed
/// from an empty stack, so every instruction has a definition once the pass
/// completes. Running the pass again overwrites the previous results.
pub fn perform_reaching_analysis(program: &mut Program) {
    let (entries, jumped_to) = solve_entry_stacks(program);

    let blocks = program.blocks_mut().iter_mut().zip(entries).zip(jumped_to);
    for ((block, entry), is_jumped_to) in blocks {
        let mut state = entry.unwrap_or_default();
        block.entry_stack = Some(state.clone());
        block.is_jumped_to = is_jumped_to;

        for instruction in block.instructions_mut() {
            let definition = state.step(instruction.offset(), instruction.opcode());
            instruction.annotations.reaching = Some(definition);
        }
    }
}

/// Iterates the block transfer functions to a fixpoint, returning the stack on
/// entry to each block, or [`None`] for blocks that are never reached, along
/// with whether each block is the target of a jump.
fn solve_entry_stacks(program: &Program) -> (Vec<Option<StackState>>, Vec<bool>) {
    let block_count = program.blocks().len();
    let mut entries: Vec<Option<StackState>> = vec![None; block_count];
    let mut jumped_to = vec![false; block_count];
    let mut queued = vec![false; block_count];
    let mut worklist = VecDeque::new();

    if block_count > 0 {
        entries[0] = Some(StackState::default());
        queued[0] = true;
        worklist.push_back(0);
    }

    let mut iterations = 0usize;
    while let Some(index) = worklist.pop_front() {
        queued[index] = false;
        iterations += 1;

        let block = &program.blocks()[index];
        let mut state = entries[index].clone().unwrap_or_default();
        let mut last = ReachingDefinition::default();
        for instruction in block.instructions() {
            last = state.step(instruction.offset(), instruction.opcode());
        }

        let targets = jump_targets(program, index, &last);
        for target in &targets {
            jumped_to[*target] = true;
        }

        for successor in successors(program, index, targets) {
            let changed = match &mut entries[successor] {
                Some(existing) => existing.merge(&state),
                slot @ None => {
                    *slot = Some(state.clone());
                    true
                }
            };

            if changed && !queued[successor] {
                trace!(block = index, successor, "Entry stack changed");
                queued[successor] = true;
                worklist.push_back(successor);
            }
        }
    }

    debug!(blocks = block_count, iterations, "Reaching definitions converged");
    (entries, jumped_to)
}

/// Gets the indices of the blocks that the jump ending block `index` can
/// transfer control to, given the definitions consumed by that jump.
fn jump_targets(program: &Program, index: usize, last: &ReachingDefinition) -> Vec<usize> {
    let terminator = program.blocks()[index].terminator().opcode();
    let mut targets: Vec<usize> = vec![];

    if matches!(terminator, Opcode::Jump | Opcode::JumpI) {
        let destinations = last.operand(0).into_iter().flatten();
        for producer in destinations {
            let target = program
                .instruction(*producer)
                .filter(|i| i.opcode().is_push())
                .and_then(|i| i.immediate())
                .and_then(as_offset)
                .and_then(|offset| program.jump_target(offset));
            if let Some(target) = target {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
    }

    targets
}

/// Gets the indices of the blocks that control can flow to from the end of
/// block `index`: its jump `targets` first, then the next block.
fn successors(program: &Program, index: usize, mut targets: Vec<usize>) -> Vec<usize> {
    let terminator = program.blocks()[index].terminator().opcode();
    let fallthrough = index + 1 < program.blocks().len();

    let falls_through = !terminator.halts() && terminator != Opcode::Jump;
    if falls_through && fallthrough && !targets.contains(&(index + 1)) {
        targets.push(index + 1);
    }

    targets
}

/// Interprets `value` as a code offset, if it is small enough to be one.
fn as_offset(value: U256) -> Option<u32> {
    (value <= U256::from(u32::MAX)).then(|| value.as_u32())
}

#[cfg(test)]
mod test {
    use crate::{
        bytecode,
        opcode::{Opcode, PushN},
        program::{
            reaching::{perform_reaching_analysis, Producers},
            Program,
        },
    };

    fn analysed(bytes: &[u8]) -> anyhow::Result<Program> {
        let mut program = Program::try_from(bytes)?;
        perform_reaching_analysis(&mut program);
        Ok(program)
    }

    fn producers_of(program: &Program, offset: u32, operand: usize) -> Vec<u32> {
        program
            .instruction(offset)
            .and_then(|i| i.annotations.reaching.as_ref())
            .and_then(|r| r.operand(operand))
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }

    #[test]
    fn tracks_straight_line_producers() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x01])?, // 0x00
            PushN::new(1, vec![0x02])?, // 0x02
            Opcode::SStore,             // 0x04
            Opcode::Stop,               // 0x05
        ];
        let program = analysed(&bytes)?;

        assert_eq!(producers_of(&program, 4, 0), vec![2]);
        assert_eq!(producers_of(&program, 4, 1), vec![0]);

        Ok(())
    }

    #[test]
    fn sees_through_dup_and_swap() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x01])?, // 0x00
            PushN::new(1, vec![0x02])?, // 0x02
            Opcode::Dup(2),             // 0x04
            Opcode::Swap(1),            // 0x05
            Opcode::SStore,             // 0x06
            Opcode::Stop,               // 0x07
        ];
        let program = analysed(&bytes)?;

        // After the DUP2 the stack is [0x00, 0x02, 0x00], and the SWAP1 makes it
        // [0x00, 0x00, 0x02].
        assert_eq!(producers_of(&program, 6, 0), vec![2]);
        assert_eq!(producers_of(&program, 6, 1), vec![0]);
        assert_eq!(producers_of(&program, 4, 1), vec![0]);

        Ok(())
    }

    #[test]
    fn unions_producers_at_merge_points_in_order() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::CallValue,          // 0x00
            PushN::new(1, vec![0x0a])?, // 0x01
            Opcode::JumpI,              // 0x03
            PushN::new(1, vec![0xaa])?, // 0x04
            PushN::new(1, vec![0x0c])?, // 0x06
            Opcode::Jump,               // 0x08
            Opcode::Invalid(0xfe),      // 0x09
            Opcode::JumpDest,           // 0x0a
            Opcode::Push0,              // 0x0b
            Opcode::JumpDest,           // 0x0c
            Opcode::SLoad,              // 0x0d
            Opcode::Stop,               // 0x0e
        ];
        let program = analysed(&bytes)?;

        // The taken branch falls into 0x0c before the other path jumps to it.
        assert_eq!(producers_of(&program, 0x0d, 0), vec![0x0b, 0x04]);

        Ok(())
    }

    #[test]
    fn only_follows_jumps_to_valid_destinations() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x07])?, // 0x00
            PushN::new(1, vec![0x06])?, // 0x02
            Opcode::Jump,               // 0x04
            Opcode::JumpDest,           // 0x05
            Opcode::SLoad,              // 0x06
            Opcode::Stop,               // 0x07
        ];
        let program = analysed(&bytes)?;

        // 0x06 is not a `JUMPDEST`, so the block at 0x05 is unreachable and sees
        // an empty stack.
        assert!(producers_of(&program, 6, 0).is_empty());
        assert_eq!(program.blocks()[1].entry_stack.as_ref().map(|s| s.len()), Some(0));

        Ok(())
    }

    #[test]
    fn labels_blocks_that_are_jumped_to() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x07])?, // 0x00
            Opcode::JumpI,              // 0x02
            PushN::new(1, vec![0x0a])?, // 0x03
            Opcode::Jump,               // 0x05
            Opcode::JumpDest,           // 0x06
            Opcode::JumpDest,           // 0x07
            Opcode::Push0,              // 0x08
            Opcode::Stop,               // 0x09
            Opcode::JumpDest,           // 0x0a
            Opcode::Stop,               // 0x0b
        ];
        let program = analysed(&bytes)?;

        let jumped_to: Vec<u32> = program
            .blocks()
            .iter()
            .filter(|b| b.is_jumped_to)
            .map(|b| b.offset())
            .collect();
        assert_eq!(jumped_to, vec![0x07, 0x0a]);

        let listing = program.to_string();
        assert_eq!(listing.matches(":label").count(), 2);
        assert!(listing.contains("\n# Stack: []\n0x6\tJUMPDEST"));
        assert!(listing.contains(":label0\n# Stack: []\n0x7\tJUMPDEST"));
        assert!(listing.contains(":label1\n# Stack: []\n0xA\tJUMPDEST"));

        Ok(())
    }

    #[test]
    fn converges_on_loops() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::Push0,              // 0x00
            Opcode::JumpDest,           // 0x01
            PushN::new(1, vec![0x01])?, // 0x02
            Opcode::Add,                // 0x04
            PushN::new(1, vec![0x01])?, // 0x05
            Opcode::Jump,               // 0x07
        ];
        let program = analysed(&bytes)?;

        // The accumulator is either the initial zero or the previous sum.
        assert_eq!(producers_of(&program, 4, 0), vec![0x02]);
        assert_eq!(producers_of(&program, 4, 1), vec![0x00, 0x04]);

        Ok(())
    }

    #[test]
    fn keeps_the_shorter_stack_at_merges() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::CallValue,          // 0x00
            PushN::new(1, vec![0x0a])?, // 0x01
            Opcode::JumpI,              // 0x03
            Opcode::Push0,              // 0x04
            Opcode::Push0,              // 0x05
            PushN::new(1, vec![0x0a])?, // 0x06
            Opcode::Jump,               // 0x08
            Opcode::Invalid(0xfe),      // 0x09
            Opcode::JumpDest,           // 0x0a
            Opcode::Stop,               // 0x0b
        ];
        let program = analysed(&bytes)?;

        let entry = program.blocks()[3].entry_stack.clone().unwrap_or_default();
        assert_eq!(program.blocks()[3].offset(), 0x0a);
        assert_eq!(entry.len(), 0);

        Ok(())
    }

    #[test]
    fn underflowing_operands_have_no_producers() -> anyhow::Result<()> {
        let bytes = bytecode![Opcode::SLoad, Opcode::Stop];
        let program = analysed(&bytes)?;

        let definition = program.instruction(0).and_then(|i| i.annotations.reaching.clone());
        assert_eq!(definition.map(|d| d.operand(0).cloned()), Some(Some(Producers::new())));

        Ok(())
    }
}
