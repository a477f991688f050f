//! This module contains the state tracking functionality for the extractor.

use std::fmt::Debug;

use crate::{extractor::Phases, metadata::SwarmMetadata, resolver};

/// A marker trait that says that the type implementing it is an extractor
/// state.
///
/// Extractor states can be transitioned between as part of the
/// [`crate::extractor::Extractor`] state machine, and are intended to enforce
/// that correct state transitions take place.
pub trait State
where
    Self: Debug + Sized,
{
}

/// The initial state for the extractor.
#[derive(Debug)]
pub struct HasContract {
    /// The resolver configuration.
    pub config: resolver::Config,
}
impl State for HasContract {}

/// The state for an extractor that has successfully disassembled the bytecode
/// and computed the reaching definitions of each of its phases.
#[derive(Debug)]
pub struct DisassemblyComplete {
    /// The programs for the phases of the contract.
    pub phases: Phases,

    /// The metadata that was found at the end of the bytecode.
    pub metadata: Option<SwarmMetadata>,

    /// The resolver configuration.
    pub config: resolver::Config,
}
impl State for DisassemblyComplete {}

/// The extractor has resolved the calls and storage writes in each phase, and
/// correlated the phases where there are two.
#[derive(Debug)]
pub struct ResolutionComplete {
    /// The annotated programs for the phases of the contract.
    pub phases: Phases,

    /// The metadata that was found at the end of the bytecode.
    pub metadata: Option<SwarmMetadata>,

    /// The number of runtime calls resolved from constructor constants.
    pub resolved_by_constructor: usize,
}
impl State for ResolutionComplete {}
