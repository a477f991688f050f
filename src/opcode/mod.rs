//! This module contains the [`Opcode`] type, a closed representation of the
//! EVM's [opcodes](https://ethereum.org/en/developers/docs/evm/opcodes/), and
//! the [`PushN`] helper used to construct push instructions with their
//! immediate data.
//!
//! # Terminology
//!
//! When referring to stack slots, index 0 is the top of the stack at the point
//! where the instruction begins executing.

pub mod macros;

use ethnum::U256;

use crate::{
    constant::{
        DUP_OPCODE_BASE_VALUE,
        LOG_OPCODE_BASE_VALUE,
        PUSH_OPCODE_BASE_VALUE,
        PUSH_OPCODE_MAX_BYTES,
        SWAP_OPCODE_BASE_VALUE,
    },
    error::disassembly,
};

/// The byte of the designated `INVALID` opcode.
pub const INVALID_OPCODE_BYTE: u8 = 0xfe;

/// A single EVM operation.
///
/// The operations that come in families (`PUSH`, `DUP`, `SWAP` and `LOG`) carry
/// their index as data. Any byte that is not assigned to an operation decodes
/// to [`Opcode::Invalid`], retaining the original byte so that the stream can
/// be re-encoded losslessly.
///
/// Note that the immediate data of a `PUSH` is not part of the opcode, and is
/// instead carried by the instruction that contains it.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Opcode {
    Stop,
    Add,
    Mul,
    Sub,
    Div,
    SDiv,
    Mod,
    SMod,
    AddMod,
    MulMod,
    Exp,
    SignExtend,
    Lt,
    Gt,
    SLt,
    SGt,
    Eq,
    IsZero,
    And,
    Or,
    Xor,
    Not,
    Byte,
    Shl,
    Shr,
    Sar,
    Sha3,
    Address,
    Balance,
    Origin,
    Caller,
    CallValue,
    CallDataLoad,
    CallDataSize,
    CallDataCopy,
    CodeSize,
    CodeCopy,
    GasPrice,
    ExtCodeSize,
    ExtCodeCopy,
    ReturnDataSize,
    ReturnDataCopy,
    ExtCodeHash,
    BlockHash,
    CoinBase,
    Timestamp,
    Number,
    Prevrandao,
    GasLimit,
    ChainId,
    SelfBalance,
    BaseFee,
    BlobHash,
    BlobBaseFee,
    Pop,
    MLoad,
    MStore,
    MStore8,
    SLoad,
    SStore,
    Jump,
    JumpI,
    PC,
    MSize,
    Gas,
    JumpDest,
    TLoad,
    TStore,
    MCopy,
    Push0,

    /// `PUSHN` for `1 <= N <= 32`.
    Push(u8),

    /// `DUPN` for `1 <= N <= 16`.
    Dup(u8),

    /// `SWAPN` for `1 <= N <= 16`.
    Swap(u8),

    /// `LOGN` for `0 <= N <= 4`.
    Log(u8),
    Create,
    Call,
    CallCode,
    Return,
    DelegateCall,
    Create2,
    StaticCall,
    Revert,

    /// The designated `INVALID` opcode, or any unassigned byte.
    Invalid(u8),
    SelfDestruct,
}

impl Opcode {
    /// Decodes the opcode represented by `byte`.
    ///
    /// Unassigned bytes might be CBOR metadata or something otherwise invalid.
    /// They should only be reachable intentionally to cause a revert, so they
    /// are translated to [`Opcode::Invalid`].
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Stop,
            0x01 => Self::Add,
            0x02 => Self::Mul,
            0x03 => Self::Sub,
            0x04 => Self::Div,
            0x05 => Self::SDiv,
            0x06 => Self::Mod,
            0x07 => Self::SMod,
            0x08 => Self::AddMod,
            0x09 => Self::MulMod,
            0x0a => Self::Exp,
            0x0b => Self::SignExtend,
            0x10 => Self::Lt,
            0x11 => Self::Gt,
            0x12 => Self::SLt,
            0x13 => Self::SGt,
            0x14 => Self::Eq,
            0x15 => Self::IsZero,
            0x16 => Self::And,
            0x17 => Self::Or,
            0x18 => Self::Xor,
            0x19 => Self::Not,
            0x1a => Self::Byte,
            0x1b => Self::Shl,
            0x1c => Self::Shr,
            0x1d => Self::Sar,
            0x20 => Self::Sha3,
            0x30 => Self::Address,
            0x31 => Self::Balance,
            0x32 => Self::Origin,
            0x33 => Self::Caller,
            0x34 => Self::CallValue,
            0x35 => Self::CallDataLoad,
            0x36 => Self::CallDataSize,
            0x37 => Self::CallDataCopy,
            0x38 => Self::CodeSize,
            0x39 => Self::CodeCopy,
            0x3a => Self::GasPrice,
            0x3b => Self::ExtCodeSize,
            0x3c => Self::ExtCodeCopy,
            0x3d => Self::ReturnDataSize,
            0x3e => Self::ReturnDataCopy,
            0x3f => Self::ExtCodeHash,
            0x40 => Self::BlockHash,
            0x41 => Self::CoinBase,
            0x42 => Self::Timestamp,
            0x43 => Self::Number,
            0x44 => Self::Prevrandao,
            0x45 => Self::GasLimit,
            0x46 => Self::ChainId,
            0x47 => Self::SelfBalance,
            0x48 => Self::BaseFee,
            0x49 => Self::BlobHash,
            0x4a => Self::BlobBaseFee,
            0x50 => Self::Pop,
            0x51 => Self::MLoad,
            0x52 => Self::MStore,
            0x53 => Self::MStore8,
            0x54 => Self::SLoad,
            0x55 => Self::SStore,
            0x56 => Self::Jump,
            0x57 => Self::JumpI,
            0x58 => Self::PC,
            0x59 => Self::MSize,
            0x5a => Self::Gas,
            0x5b => Self::JumpDest,
            0x5c => Self::TLoad,
            0x5d => Self::TStore,
            0x5e => Self::MCopy,
            0x5f => Self::Push0,
            0x60..=0x7f => Self::Push(byte - PUSH_OPCODE_BASE_VALUE),
            0x80..=0x8f => Self::Dup(byte - DUP_OPCODE_BASE_VALUE),
            0x90..=0x9f => Self::Swap(byte - SWAP_OPCODE_BASE_VALUE),
            0xa0..=0xa4 => Self::Log(byte - LOG_OPCODE_BASE_VALUE),
            0xf0 => Self::Create,
            0xf1 => Self::Call,
            0xf2 => Self::CallCode,
            0xf3 => Self::Return,
            0xf4 => Self::DelegateCall,
            0xf5 => Self::Create2,
            0xfa => Self::StaticCall,
            0xfd => Self::Revert,
            0xff => Self::SelfDestruct,
            _ => Self::Invalid(byte),
        }
    }

    /// Gets the byte representation of the opcode.
    #[must_use]
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Stop => 0x00,
            Self::Add => 0x01,
            Self::Mul => 0x02,
            Self::Sub => 0x03,
            Self::Div => 0x04,
            Self::SDiv => 0x05,
            Self::Mod => 0x06,
            Self::SMod => 0x07,
            Self::AddMod => 0x08,
            Self::MulMod => 0x09,
            Self::Exp => 0x0a,
            Self::SignExtend => 0x0b,
            Self::Lt => 0x10,
            Self::Gt => 0x11,
            Self::SLt => 0x12,
            Self::SGt => 0x13,
            Self::Eq => 0x14,
            Self::IsZero => 0x15,
            Self::And => 0x16,
            Self::Or => 0x17,
            Self::Xor => 0x18,
            Self::Not => 0x19,
            Self::Byte => 0x1a,
            Self::Shl => 0x1b,
            Self::Shr => 0x1c,
            Self::Sar => 0x1d,
            Self::Sha3 => 0x20,
            Self::Address => 0x30,
            Self::Balance => 0x31,
            Self::Origin => 0x32,
            Self::Caller => 0x33,
            Self::CallValue => 0x34,
            Self::CallDataLoad => 0x35,
            Self::CallDataSize => 0x36,
            Self::CallDataCopy => 0x37,
            Self::CodeSize => 0x38,
            Self::CodeCopy => 0x39,
            Self::GasPrice => 0x3a,
            Self::ExtCodeSize => 0x3b,
            Self::ExtCodeCopy => 0x3c,
            Self::ReturnDataSize => 0x3d,
            Self::ReturnDataCopy => 0x3e,
            Self::ExtCodeHash => 0x3f,
            Self::BlockHash => 0x40,
            Self::CoinBase => 0x41,
            Self::Timestamp => 0x42,
            Self::Number => 0x43,
            Self::Prevrandao => 0x44,
            Self::GasLimit => 0x45,
            Self::ChainId => 0x46,
            Self::SelfBalance => 0x47,
            Self::BaseFee => 0x48,
            Self::BlobHash => 0x49,
            Self::BlobBaseFee => 0x4a,
            Self::Pop => 0x50,
            Self::MLoad => 0x51,
            Self::MStore => 0x52,
            Self::MStore8 => 0x53,
            Self::SLoad => 0x54,
            Self::SStore => 0x55,
            Self::Jump => 0x56,
            Self::JumpI => 0x57,
            Self::PC => 0x58,
            Self::MSize => 0x59,
            Self::Gas => 0x5a,
            Self::JumpDest => 0x5b,
            Self::TLoad => 0x5c,
            Self::TStore => 0x5d,
            Self::MCopy => 0x5e,
            Self::Push0 => 0x5f,
            Self::Push(n) => PUSH_OPCODE_BASE_VALUE + n,
            Self::Dup(n) => DUP_OPCODE_BASE_VALUE + n,
            Self::Swap(n) => SWAP_OPCODE_BASE_VALUE + n,
            Self::Log(n) => LOG_OPCODE_BASE_VALUE + n,
            Self::Create => 0xf0,
            Self::Call => 0xf1,
            Self::CallCode => 0xf2,
            Self::Return => 0xf3,
            Self::DelegateCall => 0xf4,
            Self::Create2 => 0xf5,
            Self::StaticCall => 0xfa,
            Self::Revert => 0xfd,
            Self::Invalid(byte) => *byte,
            Self::SelfDestruct => 0xff,
        }
    }

    /// Gets a textual representation of the opcode.
    #[must_use]
    pub fn as_text_code(&self) -> String {
        let name = match self {
            Self::Stop => "STOP",
            Self::Add => "ADD",
            Self::Mul => "MUL",
            Self::Sub => "SUB",
            Self::Div => "DIV",
            Self::SDiv => "SDIV",
            Self::Mod => "MOD",
            Self::SMod => "SMOD",
            Self::AddMod => "ADDMOD",
            Self::MulMod => "MULMOD",
            Self::Exp => "EXP",
            Self::SignExtend => "SIGNEXTEND",
            Self::Lt => "LT",
            Self::Gt => "GT",
            Self::SLt => "SLT",
            Self::SGt => "SGT",
            Self::Eq => "EQ",
            Self::IsZero => "ISZERO",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Not => "NOT",
            Self::Byte => "BYTE",
            Self::Shl => "SHL",
            Self::Shr => "SHR",
            Self::Sar => "SAR",
            Self::Sha3 => "SHA3",
            Self::Address => "ADDRESS",
            Self::Balance => "BALANCE",
            Self::Origin => "ORIGIN",
            Self::Caller => "CALLER",
            Self::CallValue => "CALLVALUE",
            Self::CallDataLoad => "CALLDATALOAD",
            Self::CallDataSize => "CALLDATASIZE",
            Self::CallDataCopy => "CALLDATACOPY",
            Self::CodeSize => "CODESIZE",
            Self::CodeCopy => "CODECOPY",
            Self::GasPrice => "GASPRICE",
            Self::ExtCodeSize => "EXTCODESIZE",
            Self::ExtCodeCopy => "EXTCODECOPY",
            Self::ReturnDataSize => "RETURNDATASIZE",
            Self::ReturnDataCopy => "RETURNDATACOPY",
            Self::ExtCodeHash => "EXTCODEHASH",
            Self::BlockHash => "BLOCKHASH",
            Self::CoinBase => "COINBASE",
            Self::Timestamp => "TIMESTAMP",
            Self::Number => "NUMBER",
            Self::Prevrandao => "PREVRANDAO",
            Self::GasLimit => "GASLIMIT",
            Self::ChainId => "CHAINID",
            Self::SelfBalance => "SELFBALANCE",
            Self::BaseFee => "BASEFEE",
            Self::BlobHash => "BLOBHASH",
            Self::BlobBaseFee => "BLOBBASEFEE",
            Self::Pop => "POP",
            Self::MLoad => "MLOAD",
            Self::MStore => "MSTORE",
            Self::MStore8 => "MSTORE8",
            Self::SLoad => "SLOAD",
            Self::SStore => "SSTORE",
            Self::Jump => "JUMP",
            Self::JumpI => "JUMPI",
            Self::PC => "PC",
            Self::MSize => "MSIZE",
            Self::Gas => "GAS",
            Self::JumpDest => "JUMPDEST",
            Self::TLoad => "TLOAD",
            Self::TStore => "TSTORE",
            Self::MCopy => "MCOPY",
            Self::Push0 => "PUSH0",
            Self::Push(n) => return format!("PUSH{n}"),
            Self::Dup(n) => return format!("DUP{n}"),
            Self::Swap(n) => return format!("SWAP{n}"),
            Self::Log(n) => return format!("LOG{n}"),
            Self::Create => "CREATE",
            Self::Call => "CALL",
            Self::CallCode => "CALLCODE",
            Self::Return => "RETURN",
            Self::DelegateCall => "DELEGATECALL",
            Self::Create2 => "CREATE2",
            Self::StaticCall => "STATICCALL",
            Self::Revert => "REVERT",
            Self::Invalid(INVALID_OPCODE_BYTE) => "INVALID",
            Self::Invalid(byte) => return format!("INVALID(0x{byte:02x})"),
            Self::SelfDestruct => "SELFDESTRUCT",
        };

        name.into()
    }

    /// Gets the number of arguments that the opcode reads from the stack.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.stack_arity().0
    }

    /// Gets the number of items that the opcode writes to the stack.
    #[must_use]
    pub fn stack_writes(&self) -> usize {
        self.stack_arity().1
    }

    /// Checks if the opcode pushes an immediate value from the instruction
    /// stream. `PUSH0` is included, and pushes the immediate zero.
    #[must_use]
    pub fn is_push(&self) -> bool {
        matches!(self, Self::Push0 | Self::Push(_))
    }

    /// Gets the number of bytes of immediate data that follow the opcode in
    /// the instruction stream.
    #[must_use]
    pub fn immediate_size(&self) -> u8 {
        match self {
            Self::Push(n) => *n,
            _ => 0,
        }
    }

    /// Checks if the opcode is one of the message calls whose target address
    /// is resolved: `CALL`, `CALLCODE` and `DELEGATECALL`.
    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call | Self::CallCode | Self::DelegateCall)
    }

    /// Checks if the opcode halts execution of the current context.
    #[must_use]
    pub fn halts(&self) -> bool {
        matches!(
            self,
            Self::Stop | Self::Return | Self::Revert | Self::Invalid(_) | Self::SelfDestruct
        )
    }

    /// Checks if the opcode is the last instruction of a basic block.
    #[must_use]
    pub fn ends_block(&self) -> bool {
        self.halts() || matches!(self, Self::Jump | Self::JumpI)
    }

    /// Gets the byte encoding of the opcode alone. For `PUSHN` this excludes
    /// the immediate data, which [`PushN::encode`] includes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        vec![self.as_byte()]
    }

    /// The `(reads, writes)` stack arity of the opcode.
    fn stack_arity(self) -> (usize, usize) {
        match self {
            Self::Stop | Self::JumpDest | Self::Invalid(_) => (0, 0),
            Self::Address
            | Self::Origin
            | Self::Caller
            | Self::CallValue
            | Self::CallDataSize
            | Self::CodeSize
            | Self::GasPrice
            | Self::ReturnDataSize
            | Self::CoinBase
            | Self::Timestamp
            | Self::Number
            | Self::Prevrandao
            | Self::GasLimit
            | Self::ChainId
            | Self::SelfBalance
            | Self::BaseFee
            | Self::BlobBaseFee
            | Self::PC
            | Self::MSize
            | Self::Gas
            | Self::Push0
            | Self::Push(_) => (0, 1),
            Self::IsZero
            | Self::Not
            | Self::Balance
            | Self::CallDataLoad
            | Self::ExtCodeSize
            | Self::ExtCodeHash
            | Self::BlockHash
            | Self::BlobHash
            | Self::MLoad
            | Self::SLoad
            | Self::TLoad => (1, 1),
            Self::Pop | Self::Jump | Self::SelfDestruct => (1, 0),
            Self::Add
            | Self::Mul
            | Self::Sub
            | Self::Div
            | Self::SDiv
            | Self::Mod
            | Self::SMod
            | Self::Exp
            | Self::SignExtend
            | Self::Lt
            | Self::Gt
            | Self::SLt
            | Self::SGt
            | Self::Eq
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::Byte
            | Self::Shl
            | Self::Shr
            | Self::Sar
            | Self::Sha3 => (2, 1),
            Self::MStore
            | Self::MStore8
            | Self::SStore
            | Self::JumpI
            | Self::TStore
            | Self::Return
            | Self::Revert => (2, 0),
            Self::AddMod | Self::MulMod | Self::Create => (3, 1),
            Self::CallDataCopy | Self::CodeCopy | Self::ReturnDataCopy | Self::MCopy => (3, 0),
            Self::ExtCodeCopy => (4, 0),
            Self::Create2 => (4, 1),
            Self::DelegateCall | Self::StaticCall => (6, 1),
            Self::Call | Self::CallCode => (7, 1),
            Self::Dup(n) => (n as usize, n as usize + 1),
            Self::Swap(n) => (n as usize + 1, n as usize + 1),
            Self::Log(n) => (n as usize + 2, 0),
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_text_code())
    }
}

/// A `PUSHN` opcode together with the `N` bytes of immediate data that follow
/// it in the instruction stream, where `0 < N <= 32`.
///
/// This exists so that literal bytecode containing pushes can be constructed,
/// most commonly through the [`crate::bytecode`] macro.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PushN {
    byte_count: u8,
    bytes:      Vec<u8>,
}

impl PushN {
    /// Construct a new instance of the `PUSHN` opcode for some `n`.
    ///
    /// The `bytes` are in big-endian byte ordering, as they appear in the
    /// bytecode.
    ///
    /// # Errors
    ///
    /// If `n` is not in the specified range, or `bytes` is not `n` bytes long.
    pub fn new(n: u8, bytes: impl Into<Vec<u8>>) -> Result<Self, disassembly::Error> {
        let bytes: Vec<u8> = bytes.into();
        if n > 0 && n <= PUSH_OPCODE_MAX_BYTES && bytes.len() == n as usize {
            Ok(Self {
                byte_count: n,
                bytes,
            })
        } else {
            Err(disassembly::Error::InvalidPushSize(n))
        }
    }

    /// Gets the opcode for this push.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        Opcode::Push(self.byte_count)
    }

    /// Gets the pushed data as a word.
    #[must_use]
    pub fn value(&self) -> U256 {
        word_from_be_slice(&self.bytes)
    }

    /// Gets the encoding of the opcode followed by its immediate data.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut encoded = self.opcode().encode();
        encoded.extend(&self.bytes);
        encoded
    }
}

/// Interprets up to 32 big-endian bytes as a word, right-aligning them.
#[must_use]
pub fn word_from_be_slice(bytes: &[u8]) -> U256 {
    let mut buf = [0u8; 32];
    let bytes = &bytes[bytes.len().saturating_sub(32)..];
    buf[32 - bytes.len()..].copy_from_slice(bytes);
    U256::from_be_bytes(buf)
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::opcode::{word_from_be_slice, Opcode, PushN};

    #[test]
    fn every_byte_round_trips() {
        for byte in 0..=u8::MAX {
            assert_eq!(Opcode::from_byte(byte).as_byte(), byte);
        }
    }

    #[test]
    fn unassigned_bytes_are_invalid() {
        assert_eq!(Opcode::from_byte(0xf9), Opcode::Invalid(0xf9));
        assert_eq!(Opcode::from_byte(0x0c), Opcode::Invalid(0x0c));
        assert_eq!(Opcode::from_byte(0xfe).as_text_code(), "INVALID");
        assert_eq!(Opcode::from_byte(0xf9).as_text_code(), "INVALID(0xf9)");
    }

    #[test]
    fn decodes_families() {
        assert_eq!(Opcode::from_byte(0x60), Opcode::Push(1));
        assert_eq!(Opcode::from_byte(0x73), Opcode::Push(20));
        assert_eq!(Opcode::from_byte(0x7f), Opcode::Push(32));
        assert_eq!(Opcode::from_byte(0x80), Opcode::Dup(1));
        assert_eq!(Opcode::from_byte(0x9f), Opcode::Swap(16));
        assert_eq!(Opcode::from_byte(0xa4), Opcode::Log(4));
        assert_eq!(Opcode::Push(20).as_text_code(), "PUSH20");
    }

    #[test]
    fn reports_stack_arity() {
        assert_eq!(Opcode::Call.arg_count(), 7);
        assert_eq!(Opcode::CallCode.arg_count(), 7);
        assert_eq!(Opcode::DelegateCall.arg_count(), 6);
        assert_eq!(Opcode::SStore.arg_count(), 2);
        assert_eq!(Opcode::SStore.stack_writes(), 0);
        assert_eq!(Opcode::SLoad.arg_count(), 1);
        assert_eq!(Opcode::SLoad.stack_writes(), 1);
        assert_eq!(Opcode::Push(4).arg_count(), 0);
        assert_eq!(Opcode::Dup(3).arg_count(), 3);
        assert_eq!(Opcode::Dup(3).stack_writes(), 4);
        assert_eq!(Opcode::Swap(2).arg_count(), 3);
        assert_eq!(Opcode::Log(2).arg_count(), 4);
    }

    #[test]
    fn classifies_opcodes() {
        assert!(Opcode::Push0.is_push());
        assert!(Opcode::Push(32).is_push());
        assert!(!Opcode::Dup(1).is_push());
        assert!(Opcode::DelegateCall.is_call());
        assert!(!Opcode::StaticCall.is_call());
        assert!(Opcode::JumpI.ends_block());
        assert!(!Opcode::JumpI.halts());
        assert!(Opcode::Revert.halts());
    }

    #[test]
    fn push_validates_its_size() {
        assert!(PushN::new(0, vec![]).is_err());
        assert!(PushN::new(33, vec![0; 33]).is_err());
        assert!(PushN::new(2, vec![0x01]).is_err());

        let push = PushN::new(2, vec![0x01, 0x02]).unwrap();
        assert_eq!(push.encode(), vec![0x61, 0x01, 0x02]);
        assert_eq!(push.value(), U256::new(0x0102));
    }

    #[test]
    fn words_are_right_aligned() {
        assert_eq!(word_from_be_slice(&[]), U256::ZERO);
        assert_eq!(word_from_be_slice(&[0xff, 0x00]), U256::new(0xff00));
        assert_eq!(word_from_be_slice(&[0xff; 32]), U256::MAX);
    }
}
