//! This module contains constants that are needed throughout the codebase.

use ethnum::U256;

/// The base byte value for the `PUSH` opcode, for `N > 0`.
///
/// This is constructed such that for `PUSHN`, `PUSH_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `PUSH` opcode.
pub const PUSH_OPCODE_BASE_VALUE: u8 = 0x5f;

/// The base byte value for the `DUP` opcode.
///
/// This is constructed such that for `DUPN`, `DUP_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `DUP` opcode.
pub const DUP_OPCODE_BASE_VALUE: u8 = 0x7f;

/// The base byte value for the `SWAP` opcode.
///
/// This is constructed such that for `SWAPN`, `SWAP_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `SWAP` opcode.
pub const SWAP_OPCODE_BASE_VALUE: u8 = 0x8f;

/// The base byte value for the `LOG` opcode.
///
/// This is constructed such that for `LOGN`, `LOG_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `LOG` opcode.
pub const LOG_OPCODE_BASE_VALUE: u8 = 0xa0;

/// The maximum number of bytes that can be pushed at once using the `PUSH`
/// opcode.
pub const PUSH_OPCODE_MAX_BYTES: u8 = 32;

/// The maximum stack depth for the EVM.
pub const MAXIMUM_STACK_DEPTH: usize = 1024;

/// The width of an address on the EVM in bytes.
pub const ADDRESS_WIDTH_BYTES: u8 = 20;

/// The 20-byte all-ones value.
///
/// Compilers emit `PUSH20 0xff..ff` as a mask and as a placeholder for
/// immutable slots, so it is never reported as a call target.
pub const ADDRESS_MASK: U256 = U256::from_words(0xffff_ffff, u128::MAX);

/// The default recursion budget for a backward trace.
pub const DEFAULT_MAXIMUM_TRACE_DEPTH: usize = 1024;

/// The default recursion budget for the secondary trace that recovers the
/// constant key operand below a `SLOAD` or `CALLDATALOAD`.
pub const DEFAULT_SLOT_TRACE_DEPTH: usize = 2;

/// The number of instructions looked through when evaluating the constant
/// offset operand of a `CODECOPY`.
pub const CODE_ENTRY_EVALUATION_DEPTH: usize = 8;

/// The length of the Swarm metadata trailer that `solc` appends to the
/// bytecode, in bytes.
pub const SWARM_METADATA_LENGTH: usize = 43;

/// The two bytes that open the Swarm metadata trailer.
pub const SWARM_METADATA_HEADER: [u8; 2] = [0xa1, 0x65];

/// The two bytes that close the Swarm metadata trailer, encoding its length.
pub const SWARM_METADATA_TRAILER: [u8; 2] = [0x00, 0x29];

/// The length of the Swarm hash embedded in the metadata trailer, in bytes.
pub const SWARM_HASH_LENGTH: usize = 32;

/// The default value for whether Swarm metadata is stripped from the bytecode
/// before disassembly.
pub const DEFAULT_STRIP_METADATA: bool = true;
