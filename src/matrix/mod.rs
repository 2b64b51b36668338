//! Target-bit model: which observable output bits a trial must witness

mod builder;

pub use builder::build_matrix;

use iced_x86::Register;

use crate::disasm::regs;

/// CPU exception kinds the oracle witnesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExceptionKind {
    /// #DE raised by a zero divisor
    DivideError,
    /// #DE raised by a quotient that does not fit the destination
    IntegerOverflow,
}

impl ExceptionKind {
    /// Stable name used in the corpus files.
    pub fn as_str(self) -> &'static str {
        match self {
            ExceptionKind::DivideError => "INT_DIVIDE_ERROR",
            ExceptionKind::IntegerOverflow => "INT_OVERFLOW",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INT_DIVIDE_ERROR" => Some(ExceptionKind::DivideError),
            "INT_OVERFLOW" => Some(ExceptionKind::IntegerOverflow),
            _ => None,
        }
    }
}

/// One unit of coverage the search loop must witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitTarget {
    /// Bit `bit_pos` of `reg` observed equal to `expected`
    Reg {
        reg: Register,
        bit_pos: u16,
        expected: u8,
    },
    /// EFLAGS bit `bit_pos` observed equal to `expected`
    Flag { bit_pos: u16, expected: u8 },
    /// The given exception observed
    Exception(ExceptionKind),
}

impl BitTarget {
    /// The polarity a trial must observe; exceptions seed like expect-0.
    pub fn expected_value(&self) -> u8 {
        match self {
            BitTarget::Reg { expected, .. } | BitTarget::Flag { expected, .. } => *expected,
            BitTarget::Exception(_) => 0,
        }
    }

    /// Short description for the probably-impossible log line.
    pub fn describe(&self) -> String {
        match self {
            BitTarget::Reg {
                reg,
                bit_pos,
                expected,
            } => format!("{}[{}] = 0b{}", regs::name(*reg), bit_pos, expected),
            BitTarget::Flag { bit_pos, expected } => {
                format!("flags[{}] = 0b{}", bit_pos, expected)
            }
            BitTarget::Exception(kind) => format!("exception = {}", kind.as_str()),
        }
    }
}
