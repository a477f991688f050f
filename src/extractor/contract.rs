//! This module contains types useful for dealing with concrete contracts that
//! you want to analyze.

use crate::{
    constant::DEFAULT_STRIP_METADATA,
    disassembly::decode_hex,
    error,
    metadata::{find_swarm_metadata, strip_swarm_metadata, SwarmMetadata},
};

/// The shape of the code that is to be analyzed.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CodeLayout {
    /// Deployed bytecode, consisting only of the runtime code.
    #[default]
    RuntimeOnly,

    /// Creation bytecode, in which the constructor is followed by the runtime
    /// code that it deploys.
    WithConstructor,
}

/// The contract that is to be analyzed by the library.
///
/// This is intended to be immutable once created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Contract {
    /// The bytecode of the contract.
    bytecode: Vec<u8>,

    /// Whether the bytecode includes the constructor.
    layout: CodeLayout,

    /// Whether the Swarm metadata trailer is removed before analysis.
    strip_metadata: bool,
}

impl Contract {
    /// Creates a new contract from the provided `bytecode` with the given
    /// `layout`.
    ///
    /// Any Swarm metadata at the end of the bytecode will be stripped unless
    /// disabled using [`Self::with_strip_metadata`].
    #[must_use]
    pub fn new(bytecode: Vec<u8>, layout: CodeLayout) -> Self {
        Self {
            bytecode,
            layout,
            strip_metadata: DEFAULT_STRIP_METADATA,
        }
    }

    /// Creates a new contract from the hex-encoded bytecode in `hex`, which may
    /// be prefixed with `0x`.
    ///
    /// # Errors
    ///
    /// If `hex` is not valid hex.
    pub fn from_hex(hex: &str, layout: CodeLayout) -> error::Result<Self> {
        Ok(Self::new(decode_hex(hex)?, layout))
    }

    /// Sets whether the Swarm metadata trailer is removed before analysis.
    #[must_use]
    pub fn with_strip_metadata(mut self, strip_metadata: bool) -> Self {
        self.strip_metadata = strip_metadata;
        self
    }

    /// Gets a reference to the bytecode of the contract.
    #[must_use]
    pub fn bytecode(&self) -> &Vec<u8> {
        &self.bytecode
    }

    /// Gets the layout of the contract's code.
    #[must_use]
    pub fn layout(&self) -> CodeLayout {
        self.layout
    }

    /// Checks whether the Swarm metadata trailer is removed before analysis.
    #[must_use]
    pub fn strip_metadata(&self) -> bool {
        self.strip_metadata
    }

    /// Gets the Swarm metadata at the end of the bytecode, if there is any.
    #[must_use]
    pub fn swarm_metadata(&self) -> Option<SwarmMetadata> {
        find_swarm_metadata(&self.bytecode)
    }

    /// Gets the bytes that are to be analyzed, which excludes the metadata
    /// trailer if it is being stripped.
    #[must_use]
    pub fn code(&self) -> &[u8] {
        if self.strip_metadata {
            strip_swarm_metadata(&self.bytecode).0
        } else {
            &self.bytecode
        }
    }
}

#[cfg(test)]
mod test {
    use crate::extractor::contract::{CodeLayout, Contract};

    fn with_trailer() -> Vec<u8> {
        let mut bytes = vec![0x60, 0x01, 0x00];
        bytes.extend([0xa1, 0x65]);
        bytes.extend(b"bzzr0");
        bytes.extend([0x58, 0x20]);
        bytes.extend([0x01; 32]);
        bytes.extend([0x00, 0x29]);
        bytes
    }

    #[test]
    fn strips_metadata_by_default() {
        let contract = Contract::new(with_trailer(), CodeLayout::RuntimeOnly);
        assert!(contract.strip_metadata());
        assert_eq!(contract.code(), &[0x60, 0x01, 0x00]);
        assert!(contract.swarm_metadata().is_some());
    }

    #[test]
    fn can_keep_metadata() {
        let contract =
            Contract::new(with_trailer(), CodeLayout::RuntimeOnly).with_strip_metadata(false);
        assert_eq!(contract.code().len(), 46);
        assert!(contract.swarm_metadata().is_some());
    }

    #[test]
    fn parses_hex() -> anyhow::Result<()> {
        let contract = Contract::from_hex("0x600100\n", CodeLayout::WithConstructor)?;
        assert_eq!(contract.bytecode(), &vec![0x60, 0x01, 0x00]);
        assert_eq!(contract.layout(), CodeLayout::WithConstructor);

        assert!(Contract::from_hex("0x6g", CodeLayout::RuntimeOnly).is_err());

        Ok(())
    }
}
