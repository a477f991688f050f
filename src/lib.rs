//! This library implements an analysis of [EVM](https://ethereum.org/en/developers/docs/evm/)
//! bytecode that aims to discover the targets of the external calls that a
//! contract makes, along with the constant slots and values of its storage
//! writes. It is a _best effort_ analysis.
//!
//! Note that this library is not intended to be nor expected to evolve into a
//! full decompiler for EVM bytecode.
//!
//! # How it Works
//!
//! From a very high level, the resolution process is performed as follows:
//!
//! 1. Bytecode is ingested and turned into a [`disassembly::InstructionStream`]
//!    after removing any Swarm metadata trailer.
//! 2. The instructions are grouped into the basic blocks of a
//!    [`program::Program`]. If the bytecode includes its constructor, it is
//!    split into separate programs for the constructor and the runtime code.
//! 3. A reaching-definitions pass determines, for every stack slot consumed by
//!    every instruction, the instructions that could have produced it.
//! 4. The [`resolver`]s trace the address operand of each call and the
//!    operands of each storage write back through those definitions, looking
//!    for constants and for loads from storage or the call input.
//! 5. Calls whose target is loaded from a storage slot that only the
//!    constructor writes to are resolved to the constant that the constructor
//!    writes.
//!
//! # Basic Usage
//!
//! For the most basic usage of the library, it is sufficient to construct an
//! `Extractor` and call the `.analyze` method, passing your contract.
//!
//! ```
//! use evm_call_resolver as ecr;
//! use evm_call_resolver::{
//!     bytecode,
//!     extractor::contract::{CodeLayout, Contract},
//!     opcode::{Opcode, PushN},
//!     resolver,
//! };
//!
//! let bytes = bytecode![
//!     Opcode::Push0,                           // Return size
//!     Opcode::Push0,                           // Return offset
//!     Opcode::Push0,                           // Argument size
//!     Opcode::Push0,                           // Argument offset
//!     Opcode::Push0,                           // Value
//!     PushN::new(20, vec![0xaa; 20]).unwrap(), // The target address
//!     Opcode::Gas,                             // Gas to forward
//!     Opcode::Call,                            // Make the call
//!     Opcode::Stop,
//! ];
//!
//! let contract = Contract::new(bytes, CodeLayout::RuntimeOnly);
//! let phases = ecr::new(contract, resolver::Config::default()).analyze().unwrap();
//!
//! let calls = phases.calls();
//! assert_eq!(calls.len(), 1);
//! assert!(calls[0].is_resolved());
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod constant;
pub mod disassembly;
pub mod error;
pub mod extractor;
pub mod metadata;
pub mod opcode;
pub mod program;
pub mod resolver;
pub mod utility;

// Re-exports to provide the library interface.
pub use extractor::{new, Phases};
