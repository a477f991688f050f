//! This module contains useful macros for working with bytecode and opcodes.

/// Constructs a bytecode input from the input instructions as literal opcodes.
///
/// Each item must have an `encode` method returning the bytes of the item,
/// which is the case for both [`crate::opcode::Opcode`] and
/// [`crate::opcode::PushN`].
///
/// # Usage
///
/// ```
/// use evm_call_resolver::{
///     bytecode,
///     opcode::{Opcode, PushN},
/// };
///
/// let bytes = bytecode![
///     PushN::new(1, vec![0x03]).unwrap(),
///     Opcode::Jump,
///     Opcode::JumpDest,
///     Opcode::Stop,
/// ];
///
/// assert_eq!(bytes, vec![0x60, 0x03, 0x56, 0x5b, 0x00]);
/// ```
#[macro_export]
macro_rules! bytecode {
    ($($path:expr),*$(,)?) => {{
        let mut vec: Vec<u8> = vec![];
        $(vec.extend($path.encode()));*;
        vec
    }};
}

// Export it scoped
pub use bytecode;
