//! This module contains the parser definition for turning a stream of bytes
//! into an [`super::InstructionStream`].
//!
//! # Implementation Note
//!
//! While it might make sense in the future to build a more robust parser based
//! on parser combinators from a library like [`nom`](https://docs.rs/nom), for
//! now it makes sense to stick to a simple system.

use ethnum::U256;

use crate::{
    error::{
        container::Locatable,
        disassembly::{Error, Result},
    },
    opcode::{word_from_be_slice, Opcode},
    program::Instruction,
};

/// Disassembles the input `bytes` into a vector of [`Instruction`]s, returning
/// a reasonable error if disassembly fails.
///
/// Each instruction records the byte offset at which it starts, and pushes
/// carry their immediate data. `PUSH0` is given the immediate zero.
///
/// # CBOR Metadata
///
/// Any byte that is unrecognised at the time of disassembly is translated to
/// [`Opcode::Invalid`], and hence metadata that has not been stripped simply
/// decodes to unreachable instructions.
///
/// # Errors
///
/// When `bytes` is empty or too large.
pub fn disassemble(bytes: &[u8]) -> Result<Vec<Instruction>> {
    if bytes.is_empty() {
        return Err(Error::EmptyBytecode.locate(0));
    }
    let locate = |offset: usize| {
        u32::try_from(offset).map_err(|_| Error::BytecodeTooLarge.locate(u32::MAX))
    };
    locate(bytes.len())?;

    let mut instructions: Vec<Instruction> = Vec::with_capacity(bytes.len());
    let mut offset = 0;

    while offset < bytes.len() {
        let instruction_pointer = locate(offset)?;
        let opcode = Opcode::from_byte(bytes[offset]);
        let data_start = offset + 1;
        let data_end = data_start + opcode.immediate_size() as usize;

        // Solc has generated valid code that ends with an incomplete push, so we have
        // to handle it by treating the unterminated push and all the subsequent bytes
        // as invalid
        if data_end > bytes.len() {
            for (index, byte) in bytes[offset..].iter().enumerate() {
                let position = locate(offset + index)?;
                instructions.push(Instruction::new(position, Opcode::Invalid(*byte), None));
            }
            break;
        }

        let immediate = match opcode {
            Opcode::Push0 => Some(U256::ZERO),
            Opcode::Push(_) => Some(word_from_be_slice(&bytes[data_start..data_end])),
            _ => None,
        };
        instructions.push(Instruction::new(instruction_pointer, opcode, immediate));
        offset = data_end;
    }

    Ok(instructions)
}
