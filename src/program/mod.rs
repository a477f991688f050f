//! This module contains the [`Program`] representation that the resolvers
//! operate on: decoded [`Instruction`]s grouped into basic [`Block`]s.
//!
//! # Annotations
//!
//! Analyses attach their results to instructions as facts. The set of facts is
//! closed and known up front, so they are stored as optional fields on the
//! [`Annotations`] record rather than in a dynamically typed map. Each fact is
//! written at most once per pass, and re-running a pass overwrites it.

pub mod reaching;

use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

use ethnum::U256;
use itertools::Itertools;

use crate::{
    disassembly::InstructionStream,
    error::disassembly,
    opcode::Opcode,
    program::reaching::{ReachingDefinition, StackState},
    resolver::{calls::CallOnAddress, stores::StoreOn},
};

/// The facts that analyses have attached to an [`Instruction`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Annotations {
    /// The producers of each stack slot the instruction consumes, written by
    /// [`reaching::perform_reaching_analysis`].
    pub reaching: Option<ReachingDefinition>,

    /// The resolved call target, written by [`crate::resolver::find_calls`]
    /// and refined by [`crate::resolver::resolve_with_constructor_constants`].
    pub call: Option<CallOnAddress>,

    /// The resolved storage write, written by [`crate::resolver::find_stores`].
    pub store: Option<StoreOn>,
}

/// A single decoded operation at a fixed offset in the bytecode.
///
/// Apart from its [`Annotations`], an instruction is immutable once decoded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    offset:    u32,
    opcode:    Opcode,
    immediate: Option<U256>,

    /// The facts attached to this instruction by analysis passes.
    pub annotations: Annotations,
}

impl Instruction {
    /// Creates a new instruction with no annotations.
    #[must_use]
    pub fn new(offset: u32, opcode: Opcode, immediate: Option<U256>) -> Self {
        Self {
            offset,
            opcode,
            immediate,
            annotations: Annotations::default(),
        }
    }

    /// Gets the byte offset of the instruction in its program's code.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Gets the operation performed by the instruction.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Gets the immediate value pushed by the instruction, if it is a push.
    #[must_use]
    pub fn immediate(&self) -> Option<U256> {
        self.immediate
    }

    /// Gets the encoding of the instruction, including any immediate data.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.opcode.encode();
        let size = self.opcode.immediate_size() as usize;
        if size > 0 {
            let word = self.immediate.unwrap_or_default().to_be_bytes();
            bytes.extend(&word[word.len() - size..]);
        }
        bytes
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.opcode, self.immediate) {
            (Opcode::Push(_), Some(value)) => write!(f, "{} 0x{value:x}", self.opcode),
            _ => write!(f, "{}", self.opcode),
        }
    }
}

/// A straight-line region of code.
///
/// Control can only enter a block at its first instruction and only leave it
/// after its last. A block is never empty.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    instructions: Vec<Instruction>,

    /// The producers of each stack slot on entry to the block.
    pub entry_stack: Option<StackState>,

    /// Whether any `JUMP` or `JUMPI` in the program can transfer control to
    /// the start of this block.
    pub is_jumped_to: bool,
}

impl Block {
    /// Gets the byte offset of the first instruction in the block.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.instructions[0].offset()
    }

    /// Gets the instructions that make up the block.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Gets the instructions that make up the block mutably.
    pub fn instructions_mut(&mut self) -> &mut [Instruction] {
        &mut self.instructions
    }

    /// Gets the last instruction of the block.
    #[must_use]
    #[allow(clippy::missing_panics_doc)] // Blocks are never empty
    pub fn terminator(&self) -> &Instruction {
        self.instructions.last().expect("Blocks are never empty")
    }
}

/// An ordered collection of [`Block`]s covering one contiguous code region.
///
/// That region is either a whole contract, or one of the constructor and
/// runtime phases of a contract analysed in isolation. Offsets are relative to
/// the start of the region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Program {
    blocks: Vec<Block>,

    /// Maps an instruction offset to its `(block, index)` position.
    positions: HashMap<u32, (usize, usize)>,
}

impl Program {
    /// Splits the instructions in `stream` into basic blocks.
    ///
    /// A block ends after any instruction that transfers or halts control
    /// (see [`Opcode::ends_block`]), and a new block begins at every
    /// `JUMPDEST`.
    #[must_use]
    pub fn new(stream: InstructionStream) -> Self {
        let mut blocks: Vec<Block> = vec![];
        let mut current: Vec<Instruction> = vec![];

        for instruction in Vec::<Instruction>::from(stream) {
            if instruction.opcode() == Opcode::JumpDest && !current.is_empty() {
                blocks.push(Self::make_block(std::mem::take(&mut current)));
            }
            let ends_block = instruction.opcode().ends_block();
            current.push(instruction);
            if ends_block {
                blocks.push(Self::make_block(std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() {
            blocks.push(Self::make_block(current));
        }

        let positions = blocks
            .iter()
            .enumerate()
            .flat_map(|(block_index, block)| {
                block
                    .instructions
                    .iter()
                    .enumerate()
                    .map(move |(index, i)| (i.offset(), (block_index, index)))
            })
            .collect();

        Self { blocks, positions }
    }

    fn make_block(instructions: Vec<Instruction>) -> Block {
        Block {
            instructions,
            entry_stack:  None,
            is_jumped_to: false,
        }
    }

    /// Gets the blocks of the program in code order.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Gets the blocks of the program in code order, mutably.
    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    /// Iterates over every instruction in the program in code order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// Gets the instruction that starts at `offset`, if there is one.
    #[must_use]
    pub fn instruction(&self, offset: u32) -> Option<&Instruction> {
        let (block, index) = *self.positions.get(&offset)?;
        self.blocks.get(block)?.instructions.get(index)
    }

    /// Gets the instruction that starts at `offset` mutably, if there is one.
    pub fn instruction_mut(&mut self, offset: u32) -> Option<&mut Instruction> {
        let (block, index) = *self.positions.get(&offset)?;
        self.blocks.get_mut(block)?.instructions.get_mut(index)
    }

    /// Gets the index of the block that begins with a `JUMPDEST` at `offset`,
    /// if `offset` is a valid jump target.
    #[must_use]
    pub fn jump_target(&self, offset: u32) -> Option<usize> {
        match self.positions.get(&offset) {
            Some(&(block, 0)) if self.blocks[block].offset() == offset => {
                (self.blocks[block].instructions[0].opcode() == Opcode::JumpDest).then_some(block)
            }
            _ => None,
        }
    }

    /// Checks if `offset` is a valid jump target in the program.
    #[must_use]
    pub fn is_jump_target(&self, offset: u32) -> bool {
        self.jump_target(offset).is_some()
    }
}

/// A program is usually created directly from bytecode.
impl<'a> TryFrom<&'a [u8]> for Program {
    type Error = disassembly::LocatedError;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        Ok(Self::new(InstructionStream::try_from(value)?))
    }
}

/// Renders a listing of the program: for each block, a label if it is jumped
/// to, the producers of the stack on entry, and then its instructions.
///
/// Labels are numbered in code order.
impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut labels = 0usize;
        for block in &self.blocks {
            if block.is_jumped_to {
                writeln!(f, ":label{labels}")?;
                labels += 1;
            }
            match &block.entry_stack {
                Some(stack) => writeln!(f, "# Stack: {stack}")?,
                None => writeln!(f, "# Stack: ?")?,
            }
            for instruction in &block.instructions {
                writeln!(f, "0x{:X}\t{instruction}", instruction.offset())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Renders a set of producer offsets as `{0x1, 0x2}`.
pub(crate) fn format_producers<'a>(offsets: impl IntoIterator<Item = &'a u32>) -> String {
    format!(
        "{{{}}}",
        offsets.into_iter().map(|o| format!("0x{o:x}")).join(", ")
    )
}
