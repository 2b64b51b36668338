//! x86-witness: behavioral test-corpus generator for x86-64 instructions
//!
//! For every supported mnemonic this crate enumerates distinct encodings,
//! executes each one repeatedly on the real CPU inside a traced sandbox
//! with staged register and flag inputs, and records input/output tuples
//! that witness every reachable output bit at both polarities. The
//! resulting `testdata/` corpus is ground truth for validating independent
//! x86 emulators.

pub mod corpus;
pub mod disasm;
pub mod inputs;
pub mod matrix;
pub mod progress;
pub mod sandbox;
pub mod search;

pub use corpus::collector::{generate_for_mnemonic, GenerateOptions};
pub use corpus::mnemonics::SUPPORTED_MNEMONICS;
pub use corpus::{CaseEntry, RegMap, TestGroup};
pub use disasm::decoder::{DecodedInstr, InstrDecoder};
pub use disasm::Architecture;
pub use inputs::InputGenerator;
pub use matrix::{build_matrix, BitTarget, ExceptionKind};
pub use sandbox::{ExecutionStatus, ScopedContext};
