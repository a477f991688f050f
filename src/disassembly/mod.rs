//! This module contains the implementation of the [`InstructionStream`], a type
//! that represents a sequence of decoded bytecode instructions.

mod disassembler;

use hex::FromHexError;

use crate::{
    error::{container::Locatable, disassembly, disassembly::Error},
    program::Instruction,
};

/// The instruction stream is a representation of a sequence of decoded
/// [`Instruction`]s that implements some program.
///
/// # Non-Emptiness
///
/// The instruction stream is required to contain _at least one_ instruction.
/// This is validated at construction time.
///
/// # Byte-Instruction Correspondence
///
/// Where most opcodes occupy a single byte, `PUSHN` is followed in the bytecode
/// by the `N` bytes of data that it pushes. Each instruction in the stream
/// records the byte offset at which it begins, so the offsets are not
/// contiguous across pushes.
///
/// # Size Limits
///
/// The bytecode cannot be larger than [`u32::MAX`] bytes, as offsets are
/// represented as [`u32`]. This is far beyond the size of any contract.
#[derive(Clone, Debug)]
pub struct InstructionStream {
    /// The sequence of decoded instructions.
    instructions: Vec<Instruction>,
}

impl InstructionStream {
    /// Gets the number of instructions in the stream.
    #[allow(clippy::len_without_is_empty)] // The structure cannot be empty.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Gets the instructions in the stream.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Converts the instructions in the instruction stream to their
    /// corresponding bytecode.
    ///
    /// This should always result in the same bytecode as the input to the
    /// disassembly process.
    #[must_use]
    pub fn as_bytecode(&self) -> Vec<u8> {
        self.instructions.iter().flat_map(Instruction::encode).collect()
    }
}

/// An [`InstructionStream`] is usually created from a byte array of bytecode.
impl<'a> TryFrom<&'a [u8]> for InstructionStream {
    type Error = disassembly::LocatedError;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        let instructions = disassembler::disassemble(value)?;
        let result = Self { instructions };

        // A sanity check that disassembly didn't go wrong
        debug_assert_eq!(result.as_bytecode().as_slice(), value);
        Ok(result)
    }
}

/// An [`InstructionStream`] can be created from a string as long as that string
/// is a hexadecimal encoding of the equivalent bytes, optionally prefixed with
/// `0x`.
impl TryFrom<&str> for InstructionStream {
    type Error = disassembly::LocatedError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes = decode_hex(value)?;
        InstructionStream::try_from(bytes.as_slice())
    }
}

/// Allows converting the [`InstructionStream`] back to the corresponding
/// bytecode representation.
impl From<InstructionStream> for Vec<u8> {
    fn from(value: InstructionStream) -> Self {
        value.as_bytecode()
    }
}

impl From<InstructionStream> for Vec<Instruction> {
    fn from(value: InstructionStream) -> Self {
        value.instructions
    }
}

/// Decodes the hex-encoded `value`, which may or may not start with the `0x`
/// prefix, into bytes.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// If `value` is not valid hex. The error is located at the offending index in
/// the input string.
pub fn decode_hex(value: &str) -> disassembly::Result<Vec<u8>> {
    let trimmed = value.trim();
    let no_0x_prefix = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    hex::decode(no_0x_prefix).map_err(|e| {
        let locate = |val| u32::try_from(val).unwrap_or(u32::MAX);
        if let FromHexError::InvalidHexCharacter { c, index } = e {
            Error::InvalidHexCharacter(c, index).locate(locate(index))
        } else {
            Error::InvalidHexLength.locate(locate(no_0x_prefix.len()))
        }
    })
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::{
        bytecode,
        constant::{DUP_OPCODE_BASE_VALUE, SWAP_OPCODE_BASE_VALUE},
        disassembly::InstructionStream,
        error::disassembly,
        opcode::{Opcode, PushN},
    };

    #[test]
    fn can_parse_from_bytes() {
        let bytes: Vec<u8> = (0..=u8::MAX)
            .filter(|b| Opcode::from_byte(*b).immediate_size() == 0)
            .collect();

        let instruction_stream =
            InstructionStream::try_from(bytes.as_slice()).expect("Parsing errored");
        assert_eq!(instruction_stream.len(), bytes.len());

        // The bytecode from it should equal the original bytecode.
        let bytecode: Vec<u8> = instruction_stream.into();
        assert_eq!(bytecode, bytes);
    }

    #[test]
    fn can_parse_from_hex_stream() {
        let bytes = bytecode![
            PushN::new(1, vec![0x80]).unwrap(),
            PushN::new(1, vec![0x40]).unwrap(),
            Opcode::MStore,
        ];
        let hex_string = format!("0x{}", hex::encode(bytes.as_slice()));

        let instruction_stream =
            InstructionStream::try_from(hex_string.as_str()).expect("Parsing errored");

        let bytecode: Vec<u8> = instruction_stream.into();
        assert_eq!(bytecode, bytes);
    }

    #[test]
    fn translates_unknown_opcode_to_invalid() {
        let bytes: Vec<u8> = vec![0xf9];

        let result = InstructionStream::try_from(bytes.as_slice()).expect("Parsing errored");
        assert_eq!(result.instructions()[0].opcode(), Opcode::Invalid(0xf9));
    }

    #[test]
    fn emits_parse_error_on_incorrectly_encoded_hex_string() {
        // This is not actually hex-encoded.
        let not_hex_encoded = "ab70anx7302842";

        let result =
            InstructionStream::try_from(not_hex_encoded).expect_err("Parsing did not error");

        assert_eq!(result.location, 5);
        assert_eq!(
            result.payload,
            disassembly::Error::InvalidHexCharacter('n', 5)
        );
    }

    #[test]
    fn emits_parse_error_on_hex_string_with_bad_length() {
        let bad_length = "ab21fe9b5";

        let result = InstructionStream::try_from(bad_length).expect_err("Parsing did not error");

        assert_eq!(result.location, u32::try_from(bad_length.len()).unwrap());
        assert_eq!(result.payload, disassembly::Error::InvalidHexLength);
    }

    #[test]
    fn emits_parse_error_on_empty_input() {
        let input: Vec<u8> = vec![];

        let result =
            InstructionStream::try_from(input.as_slice()).expect_err("Parsing did not error");

        assert_eq!(result.location, 0);
        assert_eq!(result.payload, disassembly::Error::EmptyBytecode);
    }

    #[test]
    fn can_parse_push_opcodes() -> anyhow::Result<()> {
        let mut bytes: Vec<u8> = vec![];
        for n in 1..=32u8 {
            bytes.extend(PushN::new(n, vec![n; n as usize])?.encode());
        }

        let result = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        assert_eq!(result.len(), 32);

        let last = &result.instructions()[31];
        assert_eq!(last.opcode(), Opcode::Push(32));
        assert_eq!(last.immediate(), Some(U256::from_be_bytes([32; 32])));

        let bytecode: Vec<u8> = result.into();
        assert_eq!(bytecode, bytes);

        Ok(())
    }

    #[test]
    fn records_byte_offsets() {
        let bytes = bytecode![
            PushN::new(2, vec![0x01, 0x02]).unwrap(),
            Opcode::Push0,
            Opcode::SLoad,
        ];

        let result = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let offsets: Vec<u32> = result.instructions().iter().map(|i| i.offset()).collect();
        assert_eq!(offsets, vec![0, 3, 4]);
        assert_eq!(result.instructions()[1].immediate(), Some(U256::ZERO));
        assert_eq!(result.instructions()[2].immediate(), None);
    }

    #[test]
    fn can_parse_dup_and_swap_opcodes() {
        let mut bytes: Vec<u8> = vec![];
        for x in 1..=16 {
            bytes.push(DUP_OPCODE_BASE_VALUE + x);
            bytes.push(SWAP_OPCODE_BASE_VALUE + x);
        }

        let result = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        assert_eq!(result.instructions()[0].opcode(), Opcode::Dup(1));
        assert_eq!(result.instructions()[31].opcode(), Opcode::Swap(16));
    }

    #[test]
    fn treats_truncated_push_as_invalid() {
        // A `PUSH4` with only two bytes of data.
        let bytes: Vec<u8> = vec![0x00, 0x63, 0xaa, 0xbb];

        let result = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let opcodes: Vec<Opcode> = result.instructions().iter().map(|i| i.opcode()).collect();
        assert_eq!(
            opcodes,
            vec![
                Opcode::Stop,
                Opcode::Invalid(0x63),
                Opcode::Invalid(0xaa),
                Opcode::Invalid(0xbb)
            ]
        );

        let bytecode: Vec<u8> = result.into();
        assert_eq!(bytecode, bytes);
    }
}
