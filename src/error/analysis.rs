//! This module contains the error type for preparing disassembled bytecode for
//! resolution, most notably splitting constructor and runtime code.

use thiserror::Error;

use crate::error::container;

/// Errors that occur while preparing the programs that the resolvers run on.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("No constant code entry point was found in the constructor")]
    NoCodeEntryPoint,

    #[error("Code entry point {entry:#x} is outside of the {available} bytes of available code")]
    CodeEntryPointOutOfBounds { entry: u32, available: usize },
}

/// An analysis error with an associated location in the bytecode.
pub type LocatedError = container::Located<Error>;

/// The result type for functions that may return analysis errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// Make it possible to attach locations to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, offset: u32) -> Self::Located {
        container::Located {
            location: offset,
            payload:  self,
        }
    }
}
