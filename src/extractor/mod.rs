//! This module contains the definition of the extractor itself.

pub mod contract;
pub mod state;

use tracing::{info, warn};

use crate::{
    error,
    error::{analysis, container::Locatable},
    extractor::{
        contract::{CodeLayout, Contract},
        state::State,
    },
    metadata::SwarmMetadata,
    program::{reaching::perform_reaching_analysis, Program},
    resolver,
    resolver::{
        calls::CallOnAddress,
        find_calls,
        find_code_entry_point,
        find_stores,
        resolve_with_constructor_constants,
        stores::StoreOn,
    },
};

/// Creates a new extractor wrapping the provided `contract`, and with the
/// provided resolver `config`.
#[must_use]
pub fn new(contract: Contract, config: resolver::Config) -> Extractor<state::HasContract> {
    let state = state::HasContract { config };
    Extractor { contract, state }
}

/// The phases of a contract, each disassembled into its own [`Program`].
///
/// The offsets in each program are relative to the start of that phase's code.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Phases {
    /// Deployed code with no constructor.
    Runtime(Program),

    /// Creation code, split at the point where the runtime code begins.
    Split {
        constructor: Program,
        runtime:     Program,
    },
}

impl Phases {
    /// Gets the program for the runtime code.
    #[must_use]
    pub fn runtime(&self) -> &Program {
        match self {
            Self::Runtime(runtime) | Self::Split { runtime, .. } => runtime,
        }
    }

    /// Gets the program for the constructor, if the contract has one.
    #[must_use]
    pub fn constructor(&self) -> Option<&Program> {
        match self {
            Self::Runtime(_) => None,
            Self::Split { constructor, .. } => Some(constructor),
        }
    }

    /// Gets the programs in the order that their code appears in the contract.
    #[must_use]
    pub fn programs(&self) -> Vec<&Program> {
        self.constructor().into_iter().chain([self.runtime()]).collect()
    }

    fn programs_mut(&mut self) -> Vec<&mut Program> {
        match self {
            Self::Runtime(runtime) => vec![runtime],
            Self::Split {
                constructor,
                runtime,
            } => vec![constructor, runtime],
        }
    }

    /// Gets the call annotations across all phases, in code order.
    #[must_use]
    pub fn calls(&self) -> Vec<&CallOnAddress> {
        self.programs()
            .into_iter()
            .flat_map(Program::instructions)
            .filter_map(|i| i.annotations.call.as_ref())
            .collect()
    }

    /// Gets the store annotations across all phases, in code order.
    #[must_use]
    pub fn stores(&self) -> Vec<&StoreOn> {
        self.programs()
            .into_iter()
            .flat_map(Program::instructions)
            .filter_map(|i| i.annotations.store.as_ref())
            .collect()
    }
}

/// The core of the resolution process, the `Extractor` is responsible for
/// ingesting user data and outputting annotated programs.
///
/// # Enforcing Valid State Transitions
///
/// The extractor enforces that only correct state transitions can occur through
/// use of structs that implement the exact state required by it at any given
/// point.
///
/// There is the [`Self::state`] function that provides access to the state data
/// of whichever state the extractor is currently in.
#[derive(Debug)]
pub struct Extractor<S: State> {
    /// The contract that is being analyzed.
    contract: Contract,

    /// The internal state of the extractor.
    state: S,
}

/// The safe operations available in all states.
impl<S: State> Extractor<S> {
    /// Gets a reference to the contract being analyzed.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Gets an immutable reference to the current state of the extractor.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Forces the extractor into the state `NS`, with the value of the state
    /// created by applying `transform` to the extractor's current state and
    /// disregarding any safety with regard to state transitions.
    ///
    /// # Safety
    ///
    /// Do not force a state transition for the extractor unless you totally
    /// understand the state that the extractor is in, and the implications
    /// of doing so.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the provided `transform` returns [`Err`].
    pub unsafe fn transform_state<NS: State>(
        self,
        transform: impl FnOnce(S) -> error::Result<NS>,
    ) -> error::Result<Extractor<NS>> {
        let state = transform(self.state)?;
        let contract = self.contract;

        Ok(Extractor { contract, state })
    }
}

/// A type that allows the user to easily name the initial state of the
/// extractor.
pub type InitialExtractor = Extractor<state::HasContract>;

/// Operations available on a newly-created extractor.
impl Extractor<state::HasContract> {
    /// Executes the resolution process from beginning to end, performing all
    /// the intermediate steps automatically and returning the annotated
    /// phases.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if any step in the process fails.
    pub fn analyze(self) -> error::Result<Phases> {
        let extractor = self.disassemble()?;
        let extractor = extractor.resolve();

        Ok(extractor.state.phases)
    }

    /// Disassembles the contract into a program for each of its phases, and
    /// computes their reaching definitions.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if disassembly fails, or if the runtime code cannot be
    /// found in a contract that has a constructor.
    pub fn disassemble(self) -> error::Result<Extractor<state::DisassemblyComplete>> {
        let code = self.contract.code();
        let metadata = self.contract.swarm_metadata();
        if let Some(metadata) = &metadata {
            info!(%metadata, stripped = self.contract.strip_metadata(), "Found Swarm metadata");
        }

        let config = self.state.config.clone();
        let phases = match self.contract.layout() {
            CodeLayout::RuntimeOnly => Phases::Runtime(analysed_program(code)?),
            CodeLayout::WithConstructor => split_phases(code, &config)?,
        };

        unsafe {
            self.transform_state(|old_state| {
                let config = old_state.config;
                Ok(state::DisassemblyComplete {
                    phases,
                    metadata,
                    config,
                })
            })
        }
    }
}

/// Operations available on an extractor that has completed the disassembly of
/// the bytecode.
impl Extractor<state::DisassemblyComplete> {
    /// Resolves the calls and storage writes in each phase, then correlates the
    /// runtime with the constructor if there is one.
    #[allow(clippy::missing_panics_doc)] // Explicit closure can never return Err
    #[must_use]
    pub fn resolve(self) -> Extractor<state::ResolutionComplete> {
        unsafe {
            // Safe to unwrap as we guarantee that the internal operations cannot fail.
            self.transform_state(|mut old_state| {
                let config = &old_state.config;
                for program in old_state.phases.programs_mut() {
                    find_calls(program, config);
                    find_stores(program, config);
                }
                info!("Resolved calls and stores");

                let resolved_by_constructor = match &mut old_state.phases {
                    Phases::Runtime(_) => 0,
                    Phases::Split {
                        constructor,
                        runtime,
                    } => resolve_with_constructor_constants(runtime, constructor),
                };

                Ok(state::ResolutionComplete {
                    phases: old_state.phases,
                    metadata: old_state.metadata,
                    resolved_by_constructor,
                })
            })
            .expect("Explicit closure cannot return Err")
        }
    }

    /// Gets the disassembled phases of the contract.
    #[must_use]
    pub fn phases(&self) -> &Phases {
        &self.state.phases
    }
}

/// Operations available on an extractor that has completed resolution.
impl Extractor<state::ResolutionComplete> {
    /// Gets the annotated phases of the contract.
    #[must_use]
    pub fn phases(&self) -> &Phases {
        &self.state.phases
    }

    /// Gets the Swarm metadata found at the end of the bytecode, if any.
    #[must_use]
    pub fn metadata(&self) -> Option<&SwarmMetadata> {
        self.state.metadata.as_ref()
    }

    /// Gets the number of runtime calls that were resolved from constants set
    /// by the constructor.
    #[must_use]
    pub fn resolved_by_constructor(&self) -> usize {
        self.state.resolved_by_constructor
    }
}

/// Disassembles `code` and runs the reaching-definitions pass over it.
fn analysed_program(code: &[u8]) -> error::Result<Program> {
    let mut program = Program::try_from(code)?;
    perform_reaching_analysis(&mut program);
    info!(
        bytes = code.len(),
        blocks = program.blocks().len(),
        "Disassembled program"
    );
    Ok(program)
}

/// Splits creation code into its constructor and runtime phases, at the offset
/// that the constructor copies the runtime code from.
fn split_phases(code: &[u8], config: &resolver::Config) -> error::Result<Phases> {
    let full = analysed_program(code)?;
    let entry = match find_code_entry_point(&full, config) {
        Some(0) | None => {
            warn!("No code entry point found in constructor");
            return Err(analysis::Error::NoCodeEntryPoint.locate(0).into());
        }
        Some(entry) => entry,
    };
    if entry as usize >= code.len() {
        warn!(entry, available = code.len(), "Code entry point is out of bounds");
        return Err(analysis::Error::CodeEntryPointOutOfBounds {
            entry,
            available: code.len(),
        }
        .locate(entry)
        .into());
    }

    info!(entry, "Splitting constructor from runtime code");
    let (constructor, runtime) = code.split_at(entry as usize);
    Ok(Phases::Split {
        constructor: analysed_program(constructor)?,
        runtime:     analysed_program(runtime)?,
    })
}

#[cfg(test)]
mod test {
    use crate::{
        bytecode,
        error::{analysis, Error},
        extractor::{
            contract::{CodeLayout, Contract},
            Phases,
        },
        opcode::{Opcode, PushN},
        resolver,
    };

    #[test]
    fn analyzes_runtime_code() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::Push0,
            Opcode::Push0,
            Opcode::Push0,
            Opcode::Push0,
            Opcode::Push0,
            PushN::new(20, vec![0x99; 20])?,
            Opcode::Gas,
            Opcode::Call,
            Opcode::Stop,
        ];
        let contract = Contract::new(bytes, CodeLayout::RuntimeOnly);
        let phases = crate::new(contract, resolver::Config::default()).analyze()?;

        assert!(matches!(phases, Phases::Runtime(_)));
        assert!(phases.constructor().is_none());
        let calls = phases.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].is_resolved());

        Ok(())
    }

    #[test]
    fn fails_without_code_entry_point() -> anyhow::Result<()> {
        let bytes = bytecode![PushN::new(1, vec![0x80])?, Opcode::Stop];
        let contract = Contract::new(bytes, CodeLayout::WithConstructor);

        let error = crate::new(contract, resolver::Config::default())
            .disassemble()
            .expect_err("Disassembly did not error");
        assert_eq!(error.payload, Error::Analysis(analysis::Error::NoCodeEntryPoint));

        Ok(())
    }

    #[test]
    fn fails_with_out_of_bounds_code_entry_point() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x10])?,
            PushN::new(1, vec![0x40])?,
            Opcode::Push0,
            Opcode::CodeCopy,
            Opcode::Stop,
        ];
        let contract = Contract::new(bytes, CodeLayout::WithConstructor);

        let error = crate::new(contract, resolver::Config::default())
            .disassemble()
            .expect_err("Disassembly did not error");
        assert_eq!(error.location, 0x40);
        assert_eq!(
            error.payload,
            Error::Analysis(analysis::Error::CodeEntryPointOutOfBounds {
                entry:     0x40,
                available: 7,
            })
        );

        Ok(())
    }

    #[test]
    fn reports_empty_code() {
        let contract = Contract::new(vec![], CodeLayout::RuntimeOnly);
        assert!(crate::new(contract, resolver::Config::default()).analyze().is_err());
    }
}
