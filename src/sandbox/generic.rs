//! Fallback execution context for unsupported hosts
//!
//! Construction always fails; the group collector logs the error and drops
//! the encoding, so the analysis-only parts of the crate stay usable on
//! machines that cannot run the sandbox.

use anyhow::{bail, Result};
use iced_x86::Register;

use crate::disasm::Architecture;

use super::ExecutionStatus;

pub struct ScopedContext {
    never: std::convert::Infallible,
}

impl ScopedContext {
    pub fn new(_arch: Architecture, _code: &[u8]) -> Result<Self> {
        bail!("instruction execution requires an x86-64 Linux host");
    }

    pub fn code_address(&self) -> u64 {
        match self.never {}
    }

    pub fn set_reg_bytes(&mut self, _reg: Register, _bytes: &[u8]) {
        match self.never {}
    }

    pub fn get_reg_bytes(&self, _reg: Register) -> Vec<u8> {
        match self.never {}
    }

    pub fn set_eflags(&mut self, _value: u32) {
        match self.never {}
    }

    pub fn eflags(&self) -> u32 {
        match self.never {}
    }

    pub fn execute(&mut self) -> bool {
        match self.never {}
    }

    pub fn execution_status(&self) -> ExecutionStatus {
        match self.never {}
    }
}
