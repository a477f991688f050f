//! This module contains the primary error type for the resolver's interface.
//! It also re-exports the more specific error types that are
//! subsystem-specific.

pub mod analysis;
pub mod container;
pub mod disassembly;

use thiserror::Error;

/// The interface result type for the library.
///
/// # Usage
///
/// Any function considered to be part of the public interface of the library
/// should return this result type. Subsystems should return the more-specific
/// child error types as appropriate.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// The interface error type for the library.
///
/// All errors returned from the library interface (and hence encountered by the
/// clients of the library) should be members of this enum.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// Errors that come from the disassembly process.
    #[error(transparent)]
    Disassembly(#[from] disassembly::Error),

    /// Errors that come from preparing the bytecode for resolution.
    #[error(transparent)]
    Analysis(#[from] analysis::Error),
}

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

/// A library error with an associated bytecode location.
pub type LocatedError = container::Located<Error>;

/// Allow simple conversions from located disassembly errors by re-wrapping the
/// located error around the more general payload.
impl From<disassembly::LocatedError> for LocatedError {
    fn from(value: disassembly::LocatedError) -> Self {
        Self {
            location: value.location,
            payload:  Error::from(value.payload),
        }
    }
}

/// Allow simple conversions from located analysis errors by re-wrapping the
/// located error around the more general payload.
impl From<analysis::LocatedError> for LocatedError {
    fn from(value: analysis::LocatedError) -> Self {
        Self {
            location: value.location,
            payload:  Error::from(value.payload),
        }
    }
}
